use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// The on-disk shape of a single routine file, deserialized directly from
/// YAML before any action is built. Kept separate from the compiled form
/// so a malformed file (bad YAML) and an invalid one (a Step fails
/// `Validate`) report through distinct error paths.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutineFile {
    /// Display name for the routine; also determines nothing about its
    /// registry key, which is derived from the file's path.
    pub routine_name: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form labels consulted by `ListByTag`/`HasTag`.
    #[serde(default)]
    pub tags: Vec<String>,
    /// User-tunable variables a `RunRoutine.config` override map may set.
    #[serde(default)]
    pub config: Vec<ConfigParam>,
    /// The root action sequence, each entry still a raw JSON-ish record
    /// pending registry dispatch.
    pub steps: Vec<Value>,
    /// Background health-check registrations tied to this routine.
    #[serde(default)]
    pub sentries: Vec<SentryRecord>,
    /// If set, a Step's error is swallowed after its `issue` (if any) is
    /// reported, rather than aborting the routine immediately.
    #[serde(default)]
    pub ignore_errors: bool,
}

/// One user-tunable variable a routine declares.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigParam {
    /// The variable name seeded into the bot's store.
    pub name: String,
    /// Display label for a configuration UI.
    #[serde(default)]
    pub label: Option<String>,
    /// The input widget this param should render as.
    #[serde(default)]
    pub r#type: ConfigParamType,
    /// The value seeded when no override is supplied.
    #[serde(default)]
    pub default: Option<String>,
    /// Longer-form help text.
    #[serde(default)]
    pub description: Option<String>,
    /// Allowed values, for `Dropdown` params.
    #[serde(default)]
    pub options: Vec<String>,
    /// Minimum value, for `Number` params.
    #[serde(default)]
    pub min: Option<f64>,
    /// Maximum value, for `Number` params.
    #[serde(default)]
    pub max: Option<f64>,
    /// Whether a `RunRoutine` caller must supply an override.
    #[serde(default)]
    pub required: bool,
    /// Whether the seeded value survives `ClearNonPersistent`.
    #[serde(default)]
    pub persist: bool,
}

/// The input widget a [`ConfigParam`] renders as.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigParamType {
    /// Free-form text.
    #[default]
    Text,
    /// A numeric value, constrained by `min`/`max`.
    Number,
    /// A boolean toggle.
    Checkbox,
    /// A single choice from `options`.
    Dropdown,
    /// Seeded but never shown in a configuration UI.
    Hidden,
}

/// One background health-check registration declared alongside a routine.
#[derive(Debug, Clone, Deserialize)]
pub struct SentryRecord {
    /// The routine this sentry monitors; defaults to its enclosing file's
    /// own routine when omitted.
    #[serde(default)]
    pub routine_name: Option<String>,
    /// Tick interval, in seconds.
    #[serde(default = "default_frequency_seconds")]
    pub frequency_seconds: u64,
    /// Reporting severity; informational only, carried through to
    /// `SentryMetrics`/logging.
    #[serde(default)]
    pub severity: SentrySeverity,
    /// Controller action on a successful tick.
    #[serde(default)]
    pub on_success: SentryAction,
    /// Controller action once the failure threshold is reached.
    #[serde(default = "default_on_failure")]
    pub on_failure: SentryAction,
    /// Config overrides seeded before each tick's compiled routine runs.
    #[serde(default)]
    pub config: IndexMap<String, String>,
}

fn default_frequency_seconds() -> u64 {
    5
}

fn default_on_failure() -> SentryAction {
    SentryAction::ForceStop
}

/// A sentry's reporting severity.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SentrySeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// The controller action a sentry tick outcome triggers.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SentryAction {
    #[default]
    Resume,
    Pause,
    Stop,
    ForceStop,
}
