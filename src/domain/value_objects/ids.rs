use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(JobId);
string_id!(WorkerId);

impl WorkerId {
    /// Identity derived from the host name and process id.
    ///
    /// Falls back to the pid alone when no host name is available. Workers that
    /// must resume their own locks after a restart should be given a stable
    /// name instead.
    pub fn from_host() -> Self {
        let pid = std::process::id();
        match host_name() {
            Some(host) => Self(format!("host:{host} pid:{pid}")),
            None => Self(format!("pid:{pid}")),
        }
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::from_host()
    }
}

fn host_name() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
