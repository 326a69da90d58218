//! Command-line acquisition requests.
//!
//! Titles are written `TID-VER` or `TID-VER-TKEY`; system updates either as
//! a raw decimal version or as a firmware string `X.Y.Z-B`, which maps to
//! `X<<26 | Y<<20 | Z<<16 | B`.

use std::fmt;
use std::str::FromStr;

use crate::keys::TitleKey;
use crate::title::TitleId;
use crate::{Error, Result};

/// One title version to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRequest {
    pub title: TitleId,
    pub version: u32,
    /// Needed to synthesize a ticket for base titles and add-ons.
    pub key: Option<TitleKey>,
}

impl FromStr for TitleRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim().to_ascii_lowercase();
        let invalid = |reason| Error::InvalidRequest {
            input: s.to_owned(),
            reason,
        };

        let parts: Vec<&str> = input.split('-').collect();
        let (tid, ver, key) = match parts.as_slice() {
            [tid, ver] => (*tid, *ver, None),
            [tid, ver, key] => (*tid, *ver, Some(*key)),
            _ => return Err(invalid("should be formatted as TID-VER(-TKEY)")),
        };

        if tid.len() != 16 {
            return Err(invalid("title id must be 16 hexadecimal digits"));
        }
        let title = tid.parse::<TitleId>()?;
        let version = ver
            .parse::<u32>()
            .map_err(|_| invalid("version must be a decimal number"))?;
        let key = key.map(str::parse::<TitleKey>).transpose()?;

        Ok(Self {
            title,
            version,
            key,
        })
    }
}

impl fmt::Display for TitleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.title, self.version)
    }
}

/// Parse a system update version.
pub fn parse_system_version(s: &str) -> Result<u32> {
    let s = s.trim();
    let invalid = |reason| Error::InvalidRequest {
        input: s.to_owned(),
        reason,
    };

    let version = match s.split_once('-') {
        Some((release, build)) => {
            let nums: Vec<u32> = release
                .split('.')
                .map(str::parse::<u32>)
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| invalid("expected X.Y.Z-B"))?;
            let build: u32 = build.parse().map_err(|_| invalid("expected X.Y.Z-B"))?;
            let [major, minor, micro] = nums[..] else {
                return Err(invalid("expected X.Y.Z-B"));
            };
            if major > 0x3F || minor > 0x3F || micro > 0xF || build > 0xFFFF {
                return Err(invalid("firmware component out of range"));
            }
            (major << 26) | (minor << 20) | (micro << 16) | build
        }
        None => s
            .parse()
            .map_err(|_| invalid("version must be a decimal number or X.Y.Z-B"))?,
    };

    if version == 0 {
        return Err(invalid("looking up the latest system update is not supported"));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_title_and_version() {
        let req: TitleRequest = "0100000000010800-65536".parse().unwrap();
        assert_eq!(req.title, TitleId(0x0100_0000_0001_0800));
        assert_eq!(req.version, 65536);
        assert_eq!(req.key, None);
        assert_eq!(req.to_string(), "0100000000010800-65536");
    }

    #[test]
    fn parses_key_case_insensitively() {
        let req: TitleRequest = "0100ABCD00010000-0-00112233445566778899AABBCCDDEEFF"
            .parse()
            .unwrap();
        assert_eq!(req.title, TitleId(0x0100_abcd_0001_0000));
        assert_eq!(req.key.unwrap().to_string(), "00112233445566778899aabbccddeeff");
    }

    #[rstest]
    #[case("0100000000010000")]
    #[case("10000-0")]
    #[case("0100000000010000-x")]
    #[case("0100000000010000-0-abcd")]
    #[case("0100000000010000-0-00112233445566778899aabbccddeeff-1")]
    fn rejects_malformed(#[case] input: &str) {
        assert!(input.parse::<TitleRequest>().is_err());
    }

    #[rstest]
    #[case("5.1.0-0", 0x1410_0000)]
    #[case("6.0.0-5", 0x1800_0005)]
    #[case("1.0.0-0", 0x0400_0000)]
    #[case("450", 450)]
    fn system_versions(#[case] input: &str, #[case] expected: u32) {
        assert_eq!(parse_system_version(input).unwrap(), expected);
    }

    #[rstest]
    #[case("0")]
    #[case("5.1-0")]
    #[case("5.1.0")]
    #[case("x.y.z-b")]
    #[case("5.1.16-0")]
    fn rejects_bad_system_versions(#[case] input: &str) {
        assert!(parse_system_version(input).is_err());
    }
}
