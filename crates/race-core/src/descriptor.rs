use crate::error::HarnessError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Mongodb,
    MongodbSrv,
    Memory,
}

impl Scheme {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mongodb" => Some(Scheme::Mongodb),
            "mongodb+srv" => Some(Scheme::MongodbSrv),
            "memory" => Some(Scheme::Memory),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Mongodb => "mongodb",
            Scheme::MongodbSrv => "mongodb+srv",
            Scheme::Memory => "memory",
        }
    }
}

/// A validated connection string. Formatting (`Display` and `Debug`) always
/// redacts credentials; [`ConnectionDescriptor::expose`] is the only way to
/// read the raw value.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    raw: String,
    scheme: Scheme,
    host: String,
}

impl ConnectionDescriptor {
    pub fn parse(raw: &str) -> Result<Self, HarnessError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(HarnessError::InvalidDescriptor(
                "connection string is empty".to_string(),
            ));
        }
        let (scheme_raw, rest) = raw.split_once("://").ok_or_else(|| {
            HarnessError::InvalidDescriptor(
                "missing scheme (expected mongodb://, mongodb+srv:// or memory://)".to_string(),
            )
        })?;
        let scheme = Scheme::parse(scheme_raw).ok_or_else(|| {
            // Echo only the scheme; the rest may carry credentials.
            HarnessError::InvalidDescriptor(format!("unsupported scheme: {}", scheme_raw))
        })?;
        let authority = authority(rest);
        if rest[authority.len()..].split('?').next().unwrap_or_default().contains('@') {
            return Err(HarnessError::InvalidDescriptor(
                "userinfo contains an unencoded '/' or '?' (percent-encode credentials)"
                    .to_string(),
            ));
        }
        let host = authority
            .rsplit_once('@')
            .map(|(_, h)| h)
            .unwrap_or(authority)
            .to_string();
        match scheme {
            Scheme::Mongodb | Scheme::MongodbSrv if host.is_empty() => {
                return Err(HarnessError::InvalidDescriptor(format!(
                    "{} descriptor has no host",
                    scheme.as_str()
                )));
            }
            Scheme::Memory if !matches!(host.as_str(), "" | "atomic" | "lossy") => {
                return Err(HarnessError::InvalidDescriptor(format!(
                    "unknown memory mode: {} (expected atomic or lossy)",
                    host
                )));
            }
            _ => {}
        }
        Ok(Self {
            raw: raw.to_string(),
            scheme,
            host,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn expose(&self) -> &str {
        &self.raw
    }

    pub fn redacted(&self) -> String {
        redact(&self.raw)
    }
}

fn authority(rest: &str) -> &str {
    rest.split(['/', '?']).next().unwrap_or_default()
}

/// Masks the userinfo: everything from `//` up to the last `@` of the
/// authority, the same `@` `parse` splits the host on.
pub fn redact(raw: &str) -> String {
    let Some(start) = raw.find("//") else {
        return raw.to_string();
    };
    let after = &raw[start + 2..];
    let at = authority(after).rfind('@').or_else(|| {
        // Unencoded '/' in the userinfo pushes its '@' past the authority.
        after.split('?').next().unwrap_or_default().rfind('@')
    });
    match at {
        Some(at) => format!("{}//***:***@{}", &raw[..start], &after[at + 1..]),
        None => raw.to_string(),
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("raw", &self.redacted())
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .finish()
    }
}
