use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Div, Mul, Sub, SubAssign},
    str::FromStr,
};

/// A size in bytes, with a distinguished "unlimited" value.
///
/// Arithmetic saturates: adding anything to `UNLIMITED` yields `UNLIMITED`,
/// and subtracting `UNLIMITED` from a finite size yields zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskSize(u64);

const UNITS: [(&str, u32); 5] = [("TiB", 40), ("GiB", 30), ("MiB", 20), ("KiB", 10), ("B", 0)];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiskSizeParseError {
    #[error("Size '{0}' is empty")]
    Empty(String),

    #[error("Size '{0}' does not start with a valid number")]
    InvalidNumber(String),

    #[error("Size '{value}' has unknown unit '{unit}'")]
    InvalidUnit { value: String, unit: String },

    #[error("Size '{0}' is too big")]
    Overflow(String),
}

impl DiskSize {
    pub const ZERO: DiskSize = DiskSize(0);
    pub const UNLIMITED: DiskSize = DiskSize(u64::MAX);

    pub const fn b(n: u64) -> Self {
        DiskSize(n)
    }

    pub const fn kib(n: u64) -> Self {
        DiskSize(n << 10)
    }

    pub const fn mib(n: u64) -> Self {
        DiskSize(n << 20)
    }

    pub const fn gib(n: u64) -> Self {
        DiskSize(n << 30)
    }

    pub const fn tib(n: u64) -> Self {
        DiskSize(n << 40)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn is_unlimited(self) -> bool {
        self == Self::UNLIMITED
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Rounds down to a multiple of `grain`.
    pub fn floor(self, grain: DiskSize) -> DiskSize {
        if self.is_unlimited() || grain.0 == 0 {
            return self;
        }
        DiskSize(self.0 - self.0 % grain.0)
    }

    /// Rounds up to a multiple of `grain`.
    pub fn ceil(self, grain: DiskSize) -> DiskSize {
        if self.is_unlimited() || grain.0 == 0 || self.0 % grain.0 == 0 {
            return self;
        }
        DiskSize(self.0 - self.0 % grain.0).saturating_add(grain)
    }

    fn saturating_add(self, other: DiskSize) -> DiskSize {
        if self.is_unlimited() || other.is_unlimited() {
            return Self::UNLIMITED;
        }
        DiskSize(self.0.saturating_add(other.0))
    }

    /// Returns the given percentage of this size (floored to bytes).
    pub fn percent(self, percent: u32) -> DiskSize {
        if self.is_unlimited() {
            return self;
        }
        DiskSize(((self.0 as u128) * (percent as u128) / 100) as u64)
    }

    /// Exact representation, using the biggest binary unit that divides the
    /// size.
    pub fn to_human_string(self) -> String {
        if self.is_unlimited() {
            return "unlimited".to_owned();
        }
        if self.0 == 0 {
            return "0 B".to_owned();
        }
        let (unit, shift) = UNITS
            .iter()
            .find(|(_, shift)| self.0.trailing_zeros() >= *shift)
            .copied()
            .unwrap_or(("B", 0));
        format!("{} {}", self.0 >> shift, unit)
    }

    /// Parses a size, e.g. "10", "5GB", "1.5 GiB" or "unlimited".
    ///
    /// All units are binary: for compatibility with installation profiles
    /// "GB" is interpreted as GiB.
    pub fn parse(value: &str) -> Result<DiskSize, DiskSizeParseError> {
        let s = value.trim();
        if s.is_empty() {
            return Err(DiskSizeParseError::Empty(value.to_owned()));
        }
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::UNLIMITED);
        }

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        if number.is_empty() {
            return Err(DiskSizeParseError::InvalidNumber(value.to_owned()));
        }

        let shift = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 0,
            "k" | "kb" | "kib" => 10,
            "m" | "mb" | "mib" => 20,
            "g" | "gb" | "gib" => 30,
            "t" | "tb" | "tib" => 40,
            _ => {
                return Err(DiskSizeParseError::InvalidUnit {
                    value: value.to_owned(),
                    unit: unit.trim().to_owned(),
                })
            }
        };

        if number.contains('.') {
            let n: f64 = number
                .parse()
                .map_err(|_| DiskSizeParseError::InvalidNumber(value.to_owned()))?;
            let bytes = n * (1u64 << shift) as f64;
            if !bytes.is_finite() || bytes >= u64::MAX as f64 {
                return Err(DiskSizeParseError::Overflow(value.to_owned()));
            }
            Ok(DiskSize(bytes.round() as u64))
        } else {
            let n: u64 = number
                .parse()
                .map_err(|_| DiskSizeParseError::InvalidNumber(value.to_owned()))?;
            n.checked_mul(1u64 << shift)
                .filter(|bytes| *bytes != u64::MAX)
                .map(DiskSize)
                .ok_or_else(|| DiskSizeParseError::Overflow(value.to_owned()))
        }
    }
}

impl From<u64> for DiskSize {
    fn from(n: u64) -> Self {
        DiskSize(n)
    }
}

impl Display for DiskSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_human_string())
    }
}

impl FromStr for DiskSize {
    type Err = DiskSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Add for DiskSize {
    type Output = DiskSize;

    fn add(self, rhs: DiskSize) -> DiskSize {
        self.saturating_add(rhs)
    }
}

impl AddAssign for DiskSize {
    fn add_assign(&mut self, rhs: DiskSize) {
        *self = *self + rhs;
    }
}

impl Sub for DiskSize {
    type Output = DiskSize;

    fn sub(self, rhs: DiskSize) -> DiskSize {
        if self.is_unlimited() && !rhs.is_unlimited() {
            return Self::UNLIMITED;
        }
        DiskSize(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for DiskSize {
    fn sub_assign(&mut self, rhs: DiskSize) {
        *self = *self - rhs;
    }
}

impl Mul<u64> for DiskSize {
    type Output = DiskSize;

    fn mul(self, rhs: u64) -> DiskSize {
        if self.is_unlimited() {
            return self;
        }
        match self.0.checked_mul(rhs) {
            Some(n) if n != u64::MAX => DiskSize(n),
            _ => Self::UNLIMITED,
        }
    }
}

impl Div<u64> for DiskSize {
    type Output = DiskSize;

    fn div(self, rhs: u64) -> DiskSize {
        if self.is_unlimited() {
            return self;
        }
        DiskSize(self.0 / rhs)
    }
}

impl Sum for DiskSize {
    fn sum<I: Iterator<Item = DiskSize>>(iter: I) -> DiskSize {
        iter.fold(DiskSize::ZERO, |acc, size| acc + size)
    }
}

impl<'a> Sum<&'a DiskSize> for DiskSize {
    fn sum<I: Iterator<Item = &'a DiskSize>>(iter: I) -> DiskSize {
        iter.copied().sum()
    }
}

impl<'de> serde::Deserialize<'de> for DiskSize {
    fn deserialize<D>(deserializer: D) -> Result<DiskSize, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Size may be provided as a string (e.g. "1 GiB") or as a pure number
        // (e.g. 1024). Serde forces a number when only digits are provided, so
        // we need to deserialize as a generic value and then check the type.
        let value = serde_yaml::Value::deserialize(deserializer)?;

        match value {
            serde_yaml::Value::String(s) => DiskSize::from_str(s.as_str())
                .map_err(|e| serde::de::Error::custom(format!("invalid disk size: {e}"))),
            serde_yaml::Value::Number(n) => {
                let n = n.as_u64().ok_or_else(|| {
                    serde::de::Error::custom("invalid disk size, expected unsigned integer")
                })?;
                Ok(DiskSize(n))
            }
            _ => Err(serde::de::Error::custom("invalid disk size")),
        }
    }
}

impl serde::Serialize for DiskSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_human_string().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string() {
        assert_eq!(DiskSize::parse("1").unwrap(), DiskSize::b(1));
        assert_eq!(DiskSize::parse("20K").unwrap(), DiskSize::kib(20));
        assert_eq!(DiskSize::parse("30MB").unwrap(), DiskSize::mib(30));
        assert_eq!(DiskSize::parse("5GB").unwrap(), DiskSize::gib(5));
        assert_eq!(DiskSize::parse("5 GiB").unwrap(), DiskSize::gib(5));
        assert_eq!(DiskSize::parse("50t").unwrap(), DiskSize::tib(50));
        assert_eq!(DiskSize::parse("1.5G").unwrap(), DiskSize::mib(1536));
        assert_eq!(DiskSize::parse(" 300 K ").unwrap(), DiskSize::kib(300));
        assert_eq!(DiskSize::parse("unlimited").unwrap(), DiskSize::UNLIMITED);

        assert!(matches!(
            DiskSize::parse(""),
            Err(DiskSizeParseError::Empty(_))
        ));
        assert!(matches!(
            DiskSize::parse("max"),
            Err(DiskSizeParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            DiskSize::parse("10X"),
            Err(DiskSizeParseError::InvalidUnit { .. })
        ));
        assert!(matches!(
            DiskSize::parse("1.2.3G"),
            Err(DiskSizeParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            DiskSize::parse("99999999T"),
            Err(DiskSizeParseError::Overflow(_))
        ));
        assert!(DiskSize::parse("huh?").is_err());
        assert!(DiskSize::parse("-5G").is_err());
    }

    #[test]
    fn test_to_human_string() {
        assert_eq!(DiskSize::ZERO.to_string(), "0 B");
        assert_eq!(DiskSize::b(1023).to_string(), "1023 B");
        assert_eq!(DiskSize::kib(1).to_string(), "1 KiB");
        assert_eq!(DiskSize::mib(1025).to_string(), "1025 MiB");
        assert_eq!(DiskSize::gib(1).to_string(), "1 GiB");
        assert_eq!(DiskSize::tib(3).to_string(), "3 TiB");
        assert_eq!((DiskSize::gib(1) + DiskSize::b(1)).to_string(), "1073741825 B");
        assert_eq!(DiskSize::UNLIMITED.to_string(), "unlimited");
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(DiskSize::gib(1) + DiskSize::gib(1), DiskSize::gib(2));
        assert_eq!(DiskSize::UNLIMITED + DiskSize::gib(1), DiskSize::UNLIMITED);
        assert_eq!(DiskSize::gib(1) - DiskSize::gib(2), DiskSize::ZERO);
        assert_eq!(DiskSize::UNLIMITED - DiskSize::gib(2), DiskSize::UNLIMITED);
        assert_eq!(DiskSize::gib(2) - DiskSize::UNLIMITED, DiskSize::ZERO);
        assert_eq!(DiskSize::gib(2) * 3, DiskSize::gib(6));
        assert_eq!(DiskSize::UNLIMITED * 3, DiskSize::UNLIMITED);
        assert_eq!(DiskSize::gib(3) / 3, DiskSize::gib(1));
        assert_eq!(DiskSize::gib(250).percent(50), DiskSize::gib(125));
        assert_eq!(
            [DiskSize::mib(1), DiskSize::mib(2)].iter().sum::<DiskSize>(),
            DiskSize::mib(3)
        );
    }

    #[test]
    fn test_rounding() {
        let grain = DiskSize::mib(1);
        assert_eq!(DiskSize::kib(1536).floor(grain), DiskSize::mib(1));
        assert_eq!(DiskSize::kib(1536).ceil(grain), DiskSize::mib(2));
        assert_eq!(DiskSize::mib(2).ceil(grain), DiskSize::mib(2));
        assert_eq!(DiskSize::UNLIMITED.floor(grain), DiskSize::UNLIMITED);
    }

    #[test]
    fn test_serialization_roundtrip() {
        #[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
        struct TestStruct {
            size: DiskSize,
        }

        let test_cases = [
            ("size: 1", DiskSize::b(1), "size: 1 B"),
            ("size: 1024", DiskSize::kib(1), "size: 1 KiB"),
            ("size: 1G", DiskSize::gib(1), "size: 1 GiB"),
            ("size: 1024 MiB", DiskSize::gib(1), "size: 1 GiB"),
            ("size: unlimited", DiskSize::UNLIMITED, "size: unlimited"),
        ];

        for (input_yaml, expected, expected_yaml) in test_cases.iter() {
            let actual: TestStruct = serde_yaml::from_str(input_yaml).unwrap();
            assert_eq!(actual.size, *expected, "failed to deserialize '{input_yaml}'");

            let actual = serde_yaml::to_string(&actual).unwrap();
            assert_eq!(actual.trim(), *expected_yaml);
        }
    }
}
