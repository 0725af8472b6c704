use std::fmt;

/// A syntactically valid ORCID iD in its canonical `dddd-dddd-dddd-dddX` form.
///
/// The last character is an ISO 7064 MOD 11-2 check digit over the preceding 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrcidId(String);

/// Why a string is not an ORCID iD.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrcidIdError {
    /// Not four groups of four characters, or a non-digit outside the check position
    #[error("expected four groups of four characters separated by '-'")]
    Format,
    /// Well formed, but the last character is not the MOD 11-2 check digit
    #[error("check digit mismatch: expected {expected}")]
    Checksum {
        /// The check digit the first 15 digits call for
        expected: char,
    },
}

impl OrcidId {
    /// Parses a bare iD or an `https://orcid.org/...` URI.
    pub fn parse(input: &str) -> Result<Self, OrcidIdError> {
        let trimmed = input.trim();
        let bare = trimmed
            .strip_prefix("https://orcid.org/")
            .or_else(|| trimmed.strip_prefix("https://sandbox.orcid.org/"))
            .or_else(|| trimmed.strip_prefix("http://orcid.org/"))
            .unwrap_or(trimmed);

        if !bare.is_ascii() {
            return Err(OrcidIdError::Format);
        }
        let groups: Vec<&str> = bare.split('-').collect();
        if groups.len() != 4 || groups.iter().any(|g| g.len() != 4) {
            return Err(OrcidIdError::Format);
        }
        let chars: Vec<char> = groups.concat().to_ascii_uppercase().chars().collect();
        let (body, check) = chars.split_at(15);
        if !body.iter().all(char::is_ascii_digit) {
            return Err(OrcidIdError::Format);
        }
        let check = check[0];
        if !(check.is_ascii_digit() || check == 'X') {
            return Err(OrcidIdError::Format);
        }

        let expected = check_digit(body);
        if check != expected {
            return Err(OrcidIdError::Checksum { expected });
        }
        Ok(Self(bare.to_ascii_uppercase()))
    }

    /// The canonical iD.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_digit(digits: &[char]) -> char {
    let total = digits
        .iter()
        .filter_map(|c| c.to_digit(10))
        .fold(0u32, |total, d| (total + d) * 2);
    match (12 - total % 11) % 11 {
        10 => 'X',
        n => char::from_digit(n, 10).unwrap_or('0'),
    }
}

impl fmt::Display for OrcidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<OrcidId> for String {
    fn from(id: OrcidId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert_eq!(
            OrcidId::parse("0000-0001-2345-6789").unwrap().as_str(),
            "0000-0001-2345-6789"
        );
        assert_eq!(
            OrcidId::parse("https://orcid.org/0000-0002-1825-0097")
                .unwrap()
                .as_str(),
            "0000-0002-1825-0097"
        );
        // check digit X, lower case accepted and normalized
        assert_eq!(
            OrcidId::parse("0000-0002-1694-233x").unwrap().as_str(),
            "0000-0002-1694-233X"
        );
    }

    #[test]
    fn test_invalid_ids() {
        assert_eq!(OrcidId::parse("0000-0001-2345"), Err(OrcidIdError::Format));
        assert_eq!(
            OrcidId::parse("0000-0001-2345-678"),
            Err(OrcidIdError::Format)
        );
        assert_eq!(
            OrcidId::parse("000A-0001-2345-6789"),
            Err(OrcidIdError::Format)
        );
        assert_eq!(OrcidId::parse("0000-0001-2345-67é"), Err(OrcidIdError::Format));
        assert_eq!(
            OrcidId::parse("0000-0001-2345-6788"),
            Err(OrcidIdError::Checksum { expected: '9' })
        );
    }
}
