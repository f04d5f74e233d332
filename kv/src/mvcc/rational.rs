use crate::codec::varint::{decode_svarint, decode_uvarint, encode_svarint, encode_uvarint};
use crate::error::{CResult, Error};

/// A list sequence number, kept as an arbitrary-precision rational so a seq
/// can always be pushed one step past either end without ever re-numbering
/// existing entries.
///
/// l-push/r-push only ever need `seq - 1`/`seq + 1` over integers, so in
/// practice `den` stays 1 and `num` walks up and down an i128 line; the
/// rational shape is kept because a future midpoint-insert would need it,
/// and recovery reconstructs seqs verbatim from the encoded bytes regardless
/// of how they were produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: i128,
    pub den: i128,
}

impl Rational {
    pub fn new(num: i128, den: i128) -> Self {
        assert!(den != 0, "rational denominator must be non-zero");
        let r = Rational { num, den };
        r.normalize()
    }

    pub fn integer(n: i128) -> Self {
        Rational { num: n, den: 1 }
    }

    fn normalize(self) -> Self {
        if self.den < 0 {
            return Rational { num: -self.num, den: -self.den };
        }
        self
    }

    pub fn sub_one(self) -> Self {
        Rational::new(self.num - self.den, self.den)
    }

    pub fn add_one(self) -> Self {
        Rational::new(self.num + self.den, self.den)
    }

    /// `self > other` without overflow-prone float division, via cross-multiplication.
    pub fn gt(&self, other: &Rational) -> bool {
        self.num * other.den > other.num * self.den
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_svarint(clamp_i128(self.num), out);
        encode_uvarint(clamp_i128(self.den) as u64, out);
    }

    pub fn decode(buf: &[u8]) -> CResult<(Rational, usize)> {
        let (num, n1) = decode_svarint(buf)?;
        let (den, n2) = decode_uvarint(&buf[n1..])?;
        if den == 0 {
            return Err(Error::CorruptRecord);
        }
        Ok((Rational { num: num as i128, den: den as i128 }, n1 + n2))
    }
}

/// `num`/`den` are stored as i64-range varints: list sequence arithmetic
/// never needs the full i128 range, it's just the type push/pop math is
/// phrased in. Clamp defensively rather than silently wrapping.
fn clamp_i128(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_empty() {
        let head = Rational::integer(1);
        let tail = Rational::integer(0);
        assert!(head.gt(&tail));
    }

    #[test]
    fn push_pop_walks_integers() {
        let head = Rational::integer(1);
        let new_seq = head.sub_one();
        assert_eq!(new_seq, Rational::integer(0));
        assert!(!new_seq.gt(&Rational::integer(0)));
    }

    #[test]
    fn roundtrip_through_bytes() {
        let r = Rational::new(-7, 3);
        let mut buf = Vec::new();
        r.encode(&mut buf);
        let (decoded, n) = Rational::decode(&buf).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(n, buf.len());
    }
}
