//! Process placement guesses from job-launcher environment variables.
//!
//! The variables consulted, in priority order:
//!
//! - local rank: `FLUX_TASK_LOCAL_ID`, `SLURM_LOCALID`,
//!   `OMPI_COMM_WORLD_LOCAL_RANK`, `MV2_COMM_WORLD_LOCAL_RANK`,
//!   `MPI_LOCALRANKID`
//! - local size: `FLUX_JOB_SIZE` / `FLUX_JOB_NNODES` (assuming ranks are
//!   balanced across nodes), `SLURM_NTASKS_PER_NODE`,
//!   `OMPI_COMM_WORLD_LOCAL_SIZE`, `MV2_COMM_WORLD_LOCAL_SIZE`,
//!   `MPI_LOCALNRANKS`
//!
//! Two overrides may be set to any value that does not start with `0`:
//!
//! - `H2_SELECT_DEVICE_0`: every process selects device 0. This can rescue a
//!   bad binding, or oversubscribe device 0.
//! - `H2_SELECT_DEVICE_RR`: every process selects
//!   `local_rank % num_visible_devices`. Considered after
//!   `H2_SELECT_DEVICE_0`.
//!
//! Behavior is undefined if these differ across processes of one job.

use std::fmt;

use tracing::{debug, warn};

use super::LOG_TARGET;
use crate::{Error, Result};

pub const SELECT_DEVICE_0_ENV: &str = "H2_SELECT_DEVICE_0";
pub const SELECT_DEVICE_RR_ENV: &str = "H2_SELECT_DEVICE_RR";

/// One source for a local rank or local size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    /// A single integer variable.
    Var(&'static str),
    /// `ceil(total / parts)` of two integer variables.
    Balanced {
        total: &'static str,
        parts: &'static str,
    },
}

pub const LOCAL_RANK_PROBES: &[Probe] = &[
    Probe::Var("FLUX_TASK_LOCAL_ID"),
    Probe::Var("SLURM_LOCALID"),
    Probe::Var("OMPI_COMM_WORLD_LOCAL_RANK"), // Open MPI
    Probe::Var("MV2_COMM_WORLD_LOCAL_RANK"),  // MVAPICH2
    Probe::Var("MPI_LOCALRANKID"),            // MPICH
];

pub const LOCAL_SIZE_PROBES: &[Probe] = &[
    Probe::Balanced {
        total: "FLUX_JOB_SIZE",
        parts: "FLUX_JOB_NNODES",
    },
    Probe::Var("SLURM_NTASKS_PER_NODE"),
    Probe::Var("OMPI_COMM_WORLD_LOCAL_SIZE"),
    Probe::Var("MV2_COMM_WORLD_LOCAL_SIZE"),
    Probe::Var("MPI_LOCALNRANKS"),
];

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// A view of the environment the process was launched with.
pub struct LaunchEnv {
    lookup: Box<Lookup>,
}

impl fmt::Debug for LaunchEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchEnv")
            .field("local_rank", &self.guess_local_rank())
            .field("local_size", &self.guess_local_size())
            .finish()
    }
}

impl LaunchEnv {
    /// Read the real process environment.
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// A fixed environment, mostly useful for tests.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_lookup(move |key| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
    }

    pub fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|v| !v.is_empty())
    }

    fn resolve(&self, probe: &Probe) -> Option<i64> {
        match *probe {
            Probe::Var(key) => self.non_empty(key).map(|v| parse_int(&v)),
            Probe::Balanced { total, parts } => {
                let total = parse_int(&self.non_empty(total)?);
                let parts = parse_int(&self.non_empty(parts)?);
                if parts <= 0 {
                    return None;
                }
                Some((total + parts - 1) / parts)
            }
        }
    }

    /// First probe that yields a value wins. Negative values mean unknown.
    fn first_of(&self, probes: &[Probe]) -> Option<usize> {
        probes.iter().find_map(|probe| {
            let value = self.resolve(probe)?;
            debug!(target: LOG_TARGET, ?probe, value, "launcher variable found");
            Some(usize::try_from(value).ok())
        })?
    }

    pub fn guess_local_rank(&self) -> Option<usize> {
        self.first_of(LOCAL_RANK_PROBES)
    }

    pub fn guess_local_size(&self) -> Option<usize> {
        self.first_of(LOCAL_SIZE_PROBES)
    }

    pub fn force_device_zero(&self) -> bool {
        is_truthy(self.var(SELECT_DEVICE_0_ENV).as_deref())
    }

    pub fn force_round_robin(&self) -> bool {
        is_truthy(self.var(SELECT_DEVICE_RR_ENV).as_deref())
    }
}

/// Unset, empty and anything starting with `0` are false.
pub fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty() && !v.starts_with('0'))
}

/// Lenient integer parse: optional leading whitespace and sign, then as many
/// digits as are present. No digits parses as 0.
pub fn parse_int(value: &str) -> i64 {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Pick a device for this process among `num_devices` visible ones.
///
/// Falls back to device 0 when the local rank or size cannot be guessed.
/// Returns [`Error::Oversubscribed`] when more local ranks than devices
/// exist; callers treat that as fatal.
pub fn select_device(env: &LaunchEnv, num_devices: usize) -> Result<usize> {
    if env.force_device_zero() {
        return Ok(0);
    }

    let Some(local_rank) = env.guess_local_rank() else {
        warn!(target: LOG_TARGET, "Could not guess local rank; setting device 0.");
        return Ok(0);
    };
    let Some(local_size) = env.guess_local_size() else {
        warn!(target: LOG_TARGET, "Could not guess local size; setting device 0.");
        return Ok(0);
    };

    if env.force_round_robin() {
        if num_devices == 0 {
            return Err(Error::Oversubscribed {
                local_size,
                num_devices,
            });
        }
        return Ok(local_rank % num_devices);
    }

    // One device per local rank, assuming every rank on a node enumerates
    // devices in the same order.
    if local_size <= num_devices {
        return Ok(local_rank);
    }

    Err(Error::Oversubscribed {
        local_size,
        num_devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some("")));
        assert!(!is_truthy(Some("0")));
        assert!(!is_truthy(Some("0yes")));
        assert!(is_truthy(Some("1")));
        assert!(is_truthy(Some("true")));
    }

    #[test]
    fn lenient_ints() {
        assert_eq!(parse_int("12"), 12);
        assert_eq!(parse_int("  7abc"), 7);
        assert_eq!(parse_int("-3"), -3);
        assert_eq!(parse_int("x"), 0);
    }

    #[test]
    fn rank_priority() {
        let env = LaunchEnv::from_pairs([
            ("MPI_LOCALRANKID", "5"),
            ("SLURM_LOCALID", "2"),
            ("OMPI_COMM_WORLD_LOCAL_RANK", "3"),
        ]);
        assert_eq!(env.guess_local_rank(), Some(2));
    }

    #[test]
    fn empty_variables_are_skipped() {
        let env = LaunchEnv::from_pairs([("FLUX_TASK_LOCAL_ID", ""), ("MPI_LOCALRANKID", "1")]);
        assert_eq!(env.guess_local_rank(), Some(1));
    }

    #[test]
    fn flux_size_is_balanced_over_nodes() {
        let env = LaunchEnv::from_pairs([
            ("FLUX_JOB_SIZE", "10"),
            ("FLUX_JOB_NNODES", "4"),
            ("SLURM_NTASKS_PER_NODE", "99"),
        ]);
        assert_eq!(env.guess_local_size(), Some(3));
    }

    #[test]
    fn flux_size_without_nodes_falls_through() {
        let env = LaunchEnv::from_pairs([("FLUX_JOB_SIZE", "10"), ("MPI_LOCALNRANKS", "4")]);
        assert_eq!(env.guess_local_size(), Some(4));

        let env = LaunchEnv::from_pairs([("FLUX_JOB_SIZE", "10"), ("FLUX_JOB_NNODES", "0")]);
        assert_eq!(env.guess_local_size(), None);
    }

    #[test]
    fn negative_rank_is_unknown() {
        let env = LaunchEnv::from_pairs([("SLURM_LOCALID", "-1"), ("MPI_LOCALRANKID", "1")]);
        assert_eq!(env.guess_local_rank(), None);
    }
}
