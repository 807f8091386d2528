//! Configuration for the benchmark.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `RB__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `RB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `RB__STORAGE__BUCKET=my-bucket` sets the bucket of the benchmark object
//! - `RB__PAYLOADS__MAX=64` sets the largest payload to 64 MiB
//! - `RB__OUTPUT__TARGET__TYPE=filesystem` writes results to the local filesystem
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! storage:
//!   bucket: my-bucket
//!
//! payloads:
//!   max: 64
//!
//! output:
//!   target:
//!     type: filesystem
//!     path: out
//! ```

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use rangebench_core::{BenchConfig, MIB, Mode, ObjectRef, PayloadSweep, ThreadStep, ThreadSweep};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "RB__";

/// Region used when neither the configuration nor the host metadata provides one.
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl From<String> for ConfigSecret {
    fn from(string: String) -> Self {
        ConfigSecret(string)
    }
}

impl std::ops::Deref for ConfigSecret {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// The object storage endpoint and the object the benchmark reads from.
///
/// Used in: [`Config::storage`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Storage {
    /// Bucket containing the benchmark object.
    ///
    /// Result files are uploaded to the same bucket when [`OutputTarget::S3`] is selected.
    ///
    /// # Default
    ///
    /// `"masters-thesis-mk"`
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__BUCKET`
    pub bucket: String,

    /// Key of the benchmark object.
    ///
    /// The object must be at least as large as the largest payload.
    ///
    /// # Default
    ///
    /// `"benchmark/largefile-100G.bin"`
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__KEY`
    pub key: String,

    /// Region of the bucket.
    ///
    /// When not set, the region of the host is used if it can be discovered, and
    /// [`DEFAULT_REGION`] otherwise.
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__REGION`
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL.
    ///
    /// When set, objects are addressed path-style as `{endpoint}/{bucket}/{key}`. Otherwise,
    /// virtual-hosted style AWS endpoints are derived from the bucket and region.
    ///
    /// Examples: `http://localhost:9000` (for MinIO)
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__ENDPOINT`
    pub endpoint: Option<String>,

    /// Timeout for every request, covering the connection and the full body transfer.
    ///
    /// # Default
    ///
    /// `180s`
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__REQUEST_TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Access key id for signing requests.
    ///
    /// Falls back to `AWS_ACCESS_KEY_ID`. Requests are sent unsigned if no credentials are
    /// available.
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__ACCESS_KEY`
    pub access_key: Option<String>,

    /// Secret access key for signing requests.
    ///
    /// Falls back to `AWS_SECRET_ACCESS_KEY`.
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__SECRET_KEY`
    pub secret_key: Option<SecretBox<ConfigSecret>>,

    /// Session token for temporary credentials.
    ///
    /// Falls back to `AWS_SESSION_TOKEN`.
    ///
    /// # Environment Variable
    ///
    /// `RB__STORAGE__SESSION_TOKEN`
    pub session_token: Option<SecretBox<ConfigSecret>>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            bucket: "masters-thesis-mk".into(),
            key: "benchmark/largefile-100G.bin".into(),
            region: None,
            endpoint: None,
            request_timeout: Duration::from_secs(180),
            access_key: None,
            secret_key: None,
            session_token: None,
        }
    }
}

/// Payload sizes of the sweep, in MiB.
///
/// Sizes grow geometrically from `min` to `max`, multiplying by `step` each time.
#[derive(Debug, Deserialize, Serialize)]
pub struct Payloads {
    /// `RB__PAYLOADS__MIN`, defaults to `10`.
    pub min: u64,
    /// `RB__PAYLOADS__MAX`, defaults to `160`.
    pub max: u64,
    /// `RB__PAYLOADS__STEP`, defaults to `2`. Must be greater than one.
    pub step: u64,
    /// Start with the largest payload. `RB__PAYLOADS__REVERSE`, defaults to `false`.
    pub reverse: bool,
}

impl Default for Payloads {
    fn default() -> Self {
        Self {
            min: 10,
            max: 160,
            step: 2,
            reverse: false,
        }
    }
}

/// Thread counts of the sweep.
///
/// Unless `static` is set, `min` and `max` are multiples of the number of hardware threads of the
/// host. A `step` greater than one multiplies the thread count, a negative `step` adds its
/// absolute value.
#[derive(Debug, Deserialize, Serialize)]
pub struct Threads {
    /// `RB__THREADS__MIN`, defaults to `1.0`.
    pub min: f64,
    /// `RB__THREADS__MAX`, defaults to `2.0`.
    pub max: f64,
    /// `RB__THREADS__STEP`, defaults to `2.0`.
    pub step: f64,
    /// Use `min` and `max` as absolute thread counts. `RB__THREADS__STATIC`, defaults to `false`.
    #[serde(rename = "static")]
    pub fixed: bool,
}

impl Default for Threads {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 2.0,
            step: 2.0,
            fixed: false,
        }
    }
}

/// Number of reads per run.
#[derive(Debug, Deserialize, Serialize)]
pub struct Samples {
    /// Requested reads per run, before adaptive sizing.
    ///
    /// `RB__SAMPLES__COUNT`, defaults to `100`.
    pub count: u64,
    /// Upper bound of reads per run.
    ///
    /// `RB__SAMPLES__CAP`, defaults to `7200`.
    pub cap: u64,
}

impl Default for Samples {
    fn default() -> Self {
        Self {
            count: 100,
            cap: 7200,
        }
    }
}

/// Throttling mode, a stress test repeating one payload size and thread count until interrupted.
#[derive(Debug, Deserialize, Serialize)]
pub struct Throttling {
    /// `RB__THROTTLING__ENABLED`, defaults to `false`.
    pub enabled: bool,
    /// Flush results after every this many runs.
    ///
    /// `RB__THROTTLING__FLUSH_INTERVAL`, defaults to `128`.
    pub flush_interval: u64,
}

impl Default for Throttling {
    fn default() -> Self {
        Self {
            enabled: false,
            flush_interval: 128,
        }
    }
}

/// Where result files are written.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputTarget {
    /// Upload to the bucket of the benchmark object (type `"s3"`).
    S3,
    /// Write into a local directory (type `"filesystem"`).
    ///
    /// ```yaml
    /// output:
    ///   target:
    ///     type: filesystem
    ///     path: out
    /// ```
    FileSystem {
        /// Directory that `results/` and `stats/` are created in.
        path: PathBuf,
    },
}

/// Result files.
///
/// Summary rows are only written when `results` is set, and resource utilization is only sampled
/// and written when `stats` is set.
#[derive(Debug, Deserialize, Serialize)]
pub struct Output {
    /// File name prefix of summary rows. `RB__OUTPUT__RESULTS`
    pub results: Option<String>,
    /// File name prefix of resource utilization rows. `RB__OUTPUT__STATS`
    pub stats: Option<String>,
    /// Destination of all files, defaults to [`OutputTarget::S3`].
    pub target: OutputTarget,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            results: None,
            stats: None,
            target: OutputTarget::S3,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  rangebench_core::orchestrator > run completed
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [rangebench_core::orchestrator] INFO: run completed
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","fields":{"message":"run completed"},"target":"rangebench_core::orchestrator"}
    /// ```
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so they do not interleave with the result tables.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// `RB__LOGGING__LEVEL`, defaults to `INFO`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format, see [`LogFormat`].
    ///
    /// `RB__LOGGING__FORMAT`, defaults to `auto`.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// [Sentry](https://sentry.io/) error reporting.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
#[derive(Debug, Deserialize, Serialize)]
pub struct Sentry {
    /// Sentry DSN. `RB__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name, such as `"production"`. `RB__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Error event sampling rate.
    ///
    /// `RB__SENTRY__SAMPLE_RATE`, defaults to `1.0`.
    pub sample_rate: f32,

    /// Performance trace sampling rate.
    ///
    /// `RB__SENTRY__TRACES_SAMPLE_RATE`, defaults to `0.01`.
    pub traces_sample_rate: f32,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
        }
    }
}

/// Predefined sweeps selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Preset {
    /// Every thread count from 1 to 48 for payloads from 1 to 256 MiB.
    Full,
    /// A single thread reading 20 MiB payloads until interrupted.
    Throttling,
}

/// Main configuration struct for the benchmark.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// The storage endpoint and benchmark object.
    pub storage: Storage,
    /// Payload size sweep.
    pub payloads: Payloads,
    /// Thread count sweep.
    pub threads: Threads,
    /// Reads per run.
    pub samples: Samples,
    /// Throttling mode.
    pub throttling: Throttling,
    /// Result files.
    pub output: Output,
    /// Logging.
    pub logging: Logging,
    /// Sentry error reporting.
    pub sentry: Sentry,
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `RB__`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Overrides the sweep with a predefined one.
    pub fn apply_preset(&mut self, preset: Preset) {
        let (threads, payloads) = match preset {
            Preset::Full => ((1.0, 48.0), (1, 256)),
            Preset::Throttling => {
                self.throttling.enabled = true;
                ((1.0, 1.0), (20, 20))
            }
        };

        self.threads = Threads {
            min: threads.0,
            max: threads.1,
            step: -1.0,
            fixed: true,
        };
        self.payloads.min = payloads.0;
        self.payloads.max = payloads.1;
    }

    /// Resolves the bucket region from the configuration, the host, or the default.
    pub fn region(&self, discovered: Option<String>) -> String {
        self.storage
            .region
            .clone()
            .or(discovered)
            .unwrap_or_else(|| DEFAULT_REGION.to_owned())
    }

    /// Builds the engine configuration for a host with `hardware_threads` threads.
    ///
    /// The result is validated, so invalid settings are reported before any request is issued.
    pub fn bench_config(&self, hardware_threads: u64, dry_run: bool) -> Result<BenchConfig> {
        let scale = if self.threads.fixed {
            1.0
        } else {
            hardware_threads.max(1) as f64
        };
        let scaled = |value: f64| (value * scale).round() as u64;

        if !(self.threads.min > 0.0 && self.threads.max > 0.0) {
            anyhow::bail!("thread bounds must be positive");
        }
        let threads = ThreadSweep {
            min: scaled(self.threads.min).max(1),
            max: scaled(self.threads.max).max(1),
            step: ThreadStep::from_signed(self.threads.step)?,
        };

        let payloads = PayloadSweep {
            min: self.payloads.min,
            max: self.payloads.max,
            step: self.payloads.step,
            reverse: self.payloads.reverse,
        };

        let object = ObjectRef {
            bucket: self.storage.bucket.clone(),
            key: self.storage.key.clone(),
        };

        let mut config = BenchConfig::new(object, payloads, threads);
        config.payload_unit = MIB;
        config.samples = self.samples.count;
        config.sample_cap = self.samples.cap;
        config.dry_run = dry_run;
        if self.throttling.enabled {
            config.mode = Mode::Throttling {
                flush_interval: self.throttling.flush_interval,
            };
        }

        config.validate()?;
        Ok(config)
    }
}
