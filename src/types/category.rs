use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// STEEPV分析类别，声明顺序即报告中的输出顺序
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum SteepvCategory {
    Social,
    Technological,
    Economic,
    Environmental,
    Political,
    Values,
}

impl SteepvCategory {
    pub const ALL: [SteepvCategory; 6] = [
        SteepvCategory::Social,
        SteepvCategory::Technological,
        SteepvCategory::Economic,
        SteepvCategory::Environmental,
        SteepvCategory::Political,
        SteepvCategory::Values,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SteepvCategory::Social => "Social",
            SteepvCategory::Technological => "Technological",
            SteepvCategory::Economic => "Economic",
            SteepvCategory::Environmental => "Environmental",
            SteepvCategory::Political => "Political",
            SteepvCategory::Values => "Values",
        }
    }
}

impl Display for SteepvCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SteepvCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "social" => Ok(SteepvCategory::Social),
            "technological" | "tech" | "technology" => Ok(SteepvCategory::Technological),
            "economic" => Ok(SteepvCategory::Economic),
            "environmental" => Ok(SteepvCategory::Environmental),
            "political" => Ok(SteepvCategory::Political),
            "values" => Ok(SteepvCategory::Values),
            _ => Err(format!("Unknown STEEPV category: {}", s)),
        }
    }
}
