// -
// etcd v3 gRPC method paths

pub(crate) const ETCD_RANGE_PATH: &str = "/etcdserverpb.KV/Range";
pub(crate) const ETCD_PUT_PATH: &str = "/etcdserverpb.KV/Put";
pub(crate) const ETCD_DELETE_RANGE_PATH: &str = "/etcdserverpb.KV/DeleteRange";
pub(crate) const ETCD_WATCH_PATH: &str = "/etcdserverpb.Watch/Watch";
pub(crate) const ETCD_LEASE_TTL_PATH: &str = "/etcdserverpb.Lease/LeaseTimeToLive";

// -
// Environment

/// Prefix of environment variables overriding configuration, e.g. `MIRROR__API__EDITABLE=true`
pub(crate) const ENV_PREFIX: &str = "MIRROR";
pub(crate) const ENV_SEPARATOR: &str = "__";
/// Path of an optional configuration file layered over defaults
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

// -
// Health

pub(crate) const HEALTH_PATH_SEGMENTS: (&str, &str) = ("debug", "health");
