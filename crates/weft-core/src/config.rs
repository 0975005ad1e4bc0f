use crate::UnitId;

/// Environment variable that switches on per-pass reconciliation summaries.
pub const DEBUG_ENV: &str = "WEFT_DEBUG";

/// What a keyed list does when one emission contains the same key twice.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DuplicateKeyPolicy {
    /// Render the first occurrence and skip later ones with a warning.
    #[default]
    KeepFirst,
    Panic,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkerEdge {
    Start,
    End,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// Attribute written on the first element of a render root.
    pub root_attribute: String,
    /// Prefix of boundary comment text, `"{prefix}:start:{id}"`.
    pub marker_prefix: String,
    pub duplicate_keys: DuplicateKeyPolicy,
    pub debug: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            root_attribute: "data-weft-root".to_owned(),
            marker_prefix: "weft".to_owned(),
            duplicate_keys: DuplicateKeyPolicy::default(),
            debug: false,
        }
    }
}

impl RenderConfig {
    pub fn from_env() -> Self {
        Self {
            debug: std::env::var_os(DEBUG_ENV).is_some(),
            ..Self::default()
        }
    }

    pub fn with_duplicate_keys(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_keys = policy;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn marker_text(&self, edge: MarkerEdge, id: UnitId) -> String {
        let edge = match edge {
            MarkerEdge::Start => "start",
            MarkerEdge::End => "end",
        };
        format!("{}:{edge}:{id}", self.marker_prefix)
    }

    /// Inverse of [`marker_text`](Self::marker_text), for hydration lookups.
    pub fn parse_marker(&self, text: &str) -> Option<(MarkerEdge, UnitId)> {
        let rest = text.strip_prefix(&self.marker_prefix)?.strip_prefix(':')?;
        let (edge, id) = rest.split_once(':')?;
        let edge = match edge {
            "start" => MarkerEdge::Start,
            "end" => MarkerEdge::End,
            _ => return None,
        };
        let id = id.parse::<u64>().ok()?;
        Some((edge, UnitId::new(id)))
    }
}
