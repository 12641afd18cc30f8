//! # Constants
//!
//! Defaults and well-known names shared across the provider.

/// Annotation carrying the durable identifier of the external resource
pub const EXTERNAL_NAME_ANNOTATION: &str = "crossplane.io/external-name";

/// Finalizer held by the managed reconciler until the external resource is gone
pub const MANAGED_FINALIZER: &str = "finalizer.managedresource.crossplane.io";

/// Finalizer held on a ProviderConfig while managed resources still use it
pub const IN_USE_FINALIZER: &str = "in-use.crossplane.io";

/// Label on ProviderConfigUsage objects naming the ProviderConfig they track
pub const PROVIDER_CONFIG_LABEL: &str = "planetscale.crossplane.io/providerconfig";

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "provider-planetscale";

/// Default ProviderConfig name when a resource does not reference one
pub const DEFAULT_PROVIDER_CONFIG: &str = "default";

/// PlanetScale public API base URL
pub const DEFAULT_PLANETSCALE_API_URL: &str = "https://api.planetscale.com/v1";

/// Steady-state poll interval (seconds) used to detect external drift
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Per-attempt deadline for a reconciliation pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Maximum reconciliations running concurrently per resource kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 10;

/// First backoff delay after a failed pass (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Upper bound on the per-resource backoff delay (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;

/// Global reconcile rate shared by all kinds (passes per second)
pub const DEFAULT_GLOBAL_RATE_PER_SEC: u32 = 10;

/// Global reconcile burst shared by all kinds
pub const DEFAULT_GLOBAL_RATE_BURST: u32 = 100;

/// HTTP timeout for PlanetScale API requests (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to poll the HTTP server readiness flag (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue interval for ProviderConfig reconciliation (seconds)
pub const PROVIDER_CONFIG_REQUEUE_SECS: u64 = 30;

/// Watcher timeout (seconds), kept below the client read timeout
pub const WATCH_TIMEOUT_SECS: u32 = 25;
