use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Classification {
    Confirmed => "Confirmed",
    Probable => "Probable",
    Suspected => "Suspected",
});

str_enum!(LabResult {
    Unknown => "unknown",
    Negative => "negative",
    Positive => "positive",
    Presumed => "presumed",
});

str_enum!(Sex {
    Unknown => "Unknown",
    Male => "Male",
    Female => "Female",
    Other => "Other",
});

str_enum!(ReporterType {
    FrontlineWorker => "Frontline worker",
    CommunityVolunteer => "Community volunteer",
    Citizen => "Citizen",
});

impl LabResult {
    /// Only a positive result satisfies a lab-positivity requirement.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }

    /// Maps the legacy 0/1 column onto the four-state result.
    pub fn from_legacy_flag(flag: Option<i64>) -> Self {
        match flag {
            Some(0) => Self::Negative,
            Some(_) => Self::Positive,
            None => Self::Unknown,
        }
    }
}

impl Default for LabResult {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Default for Sex {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Default for ReporterType {
    fn default() -> Self {
        Self::FrontlineWorker
    }
}
