use std::fmt::Display;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Local,
    Development,
    Production,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Stage::Local => "Local",
            Stage::Development => "Development",
            Stage::Production => "Production",
        };
        write!(f, "{}", stage)
    }
}

impl Stage {
    pub fn try_from(stage: &str) -> anyhow::Result<Self> {
        match stage {
            "Local" => Ok(Self::Local),
            "Development" => Ok(Self::Development),
            "Production" => Ok(Self::Production),
            _ => Err(anyhow::anyhow!("Invalid stage")),
        }
    }

    /// Value handed to workers as `NODE_ENV`.
    pub fn runtime_mode(&self) -> &'static str {
        match self {
            Stage::Production => "production",
            Stage::Local | Stage::Development => "development",
        }
    }
}
