use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// BLAKE3 hex digest of `bytes`.
            pub fn from_bytes(bytes: &[u8]) -> Self {
                Self(blake3::hash(bytes).to_hex().to_string())
            }

            /// First 12 hex characters, for log lines.
            pub fn short(&self) -> &str {
                &self.0[..self.0.len().min(12)]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

hash_id!(
    /// Stable gap identity: symbol, timeframe, direction and formation time.
    GapId
);

hash_id!(
    /// Stable signal identity: symbol, direction and the contributing gap set.
    SignalId
);

hash_id!(
    /// Deterministic backtest identity: inputs, resolved parameters and data.
    RunId
);
