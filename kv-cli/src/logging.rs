//! stderr logging setup, grounded on the original `kv-cli`'s fern dispatch
//! chain but trimmed to a single stderr sink — there's no daemon here to
//! roll log files for.

use std::str::FromStr;

use anyhow::Result;
use log::LevelFilter;

pub fn init(level: &str) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {} - {}", record.level(), record.target(), message))
        })
        .level(LevelFilter::from_str(level)?)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
