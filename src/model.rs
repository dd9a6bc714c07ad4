use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSourceCode {
    Goodreads,
    Storygraph,
}

impl DataSourceCode {
    pub const ALL: [DataSourceCode; 2] = [DataSourceCode::Goodreads, DataSourceCode::Storygraph];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goodreads => "goodreads",
            Self::Storygraph => "storygraph",
        }
    }

    /// Human-facing site name used in alerts.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Goodreads => "Goodreads",
            Self::Storygraph => "Storygraph",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "goodreads" => Ok(Self::Goodreads),
            "storygraph" => Ok(Self::Storygraph),
            other => anyhow::bail!("unsupported data source: {other}"),
        }
    }
}

impl fmt::Display for DataSourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    CurrentlyReading,
    Finished,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentlyReading => f.write_str("currently-reading"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

/// A book as it appears on a tracker page. Identity is `id`; `title` may change
/// between observations of the same book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRef {
    pub id: String,
    pub title: String,
}

impl BookRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBook {
    pub id: String,
    pub user_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedUser {
    pub id: i64,
    pub chat_user_id: String,
    pub data_source: DataSourceCode,
    pub data_source_user_id: String,
    pub is_first_lookup: bool,
}

/// Source toggles, read once at the start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub goodreads_enabled: bool,
    pub storygraph_enabled: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            goodreads_enabled: true,
            storygraph_enabled: true,
        }
    }
}

impl RunConfig {
    pub fn is_enabled(&self, source: DataSourceCode) -> bool {
        match source {
            DataSourceCode::Goodreads => self.goodreads_enabled,
            DataSourceCode::Storygraph => self.storygraph_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_data_source_variants() {
        assert_eq!(
            DataSourceCode::parse("goodreads").unwrap(),
            DataSourceCode::Goodreads
        );
        assert_eq!(
            DataSourceCode::parse(" StoryGraph ").unwrap(),
            DataSourceCode::Storygraph
        );
    }

    #[test]
    fn parse_data_source_invalid() {
        let err = DataSourceCode::parse("librarything")
            .unwrap_err()
            .to_string();
        assert!(err.contains("unsupported data source"));
    }

    #[test]
    fn run_config_reads_per_source_flag() {
        let config = RunConfig {
            goodreads_enabled: false,
            storygraph_enabled: true,
        };
        assert!(!config.is_enabled(DataSourceCode::Goodreads));
        assert!(config.is_enabled(DataSourceCode::Storygraph));
    }
}
