//! Drift detection between desired and live database configuration.

use super::{AlterSettings, DesiredConfig, LiveRecord, Parameterization};
use serde::Serialize;
use std::fmt;

/// Which side wins when desired and live configuration disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityMode {
    /// The desired configuration is authoritative; used to correct drift.
    DesiredWins,
    /// The live configuration is reported; used by the passive audit.
    ObservedWins,
}

impl AuthorityMode {
    fn pick<T>(self, desired: T, observed: T) -> T {
        match self {
            Self::DesiredWins => desired,
            Self::ObservedWins => observed,
        }
    }
}

/// Sparse set of disagreeing fields.
///
/// A patch always carries at least one field; agreement is expressed as the
/// absence of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftPatch {
    /// Collation; reported only, never corrected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    /// Snapshot isolation flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_snapshot_isolation: Option<bool>,
    /// Compatibility level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_level: Option<u16>,
    /// Parameterization mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameterization: Option<Parameterization>,
}

impl DriftPatch {
    /// Compares `desired` against `live` and returns the disagreeing fields.
    ///
    /// Each populated field carries the desired value under
    /// [`AuthorityMode::DesiredWins`] and the live value under
    /// [`AuthorityMode::ObservedWins`]. Optional desired fields that are unset
    /// express no preference and are not compared. The read-committed
    /// snapshot flag is never compared.
    #[must_use]
    pub fn compare(desired: &DesiredConfig, live: &LiveRecord, mode: AuthorityMode) -> Option<Self> {
        let mut patch = Self::default();

        if let Some(collation) = &desired.collation {
            let live_collation = live.collation.as_deref().unwrap_or_default();
            if !collation.matches(live_collation) {
                patch.collation =
                    Some(mode.pick(collation.as_str(), live_collation).to_owned());
            }
        }

        if desired.allow_snapshot_isolation != live.allow_snapshot_isolation {
            patch.allow_snapshot_isolation = Some(mode.pick(
                desired.allow_snapshot_isolation,
                live.allow_snapshot_isolation,
            ));
        }

        if let Some(level) = desired.compatibility_level
            && level != live.compatibility_level
        {
            patch.compatibility_level = Some(mode.pick(level, live.compatibility_level));
        }

        if let Some(parameterization) = desired.parameterization
            && parameterization != live.parameterization
        {
            patch.parameterization = Some(mode.pick(parameterization, live.parameterization));
        }

        (!patch.is_empty()).then_some(patch)
    }

    /// Returns whether no field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.collation.is_none()
            && self.allow_snapshot_isolation.is_none()
            && self.compatibility_level.is_none()
            && self.parameterization.is_none()
    }

    /// Returns the correctable subset of the patch.
    ///
    /// Collation is immutable after creation and is therefore left out.
    #[must_use]
    pub const fn corrections(&self) -> AlterSettings {
        AlterSettings {
            parameterization: self.parameterization,
            allow_snapshot_isolation: self.allow_snapshot_isolation,
            compatibility_level: self.compatibility_level,
        }
    }
}

impl fmt::Display for DriftPatch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(collation) = &self.collation {
            parts.push(format!("collation={collation}"));
        }
        if let Some(flag) = self.allow_snapshot_isolation {
            parts.push(format!("allowSnapshotIsolation={flag}"));
        }
        if let Some(level) = self.compatibility_level {
            parts.push(format!("compatibilityLevel={level}"));
        }
        if let Some(mode) = self.parameterization {
            parts.push(format!("parameterization={mode}"));
        }
        formatter.write_str(&parts.join(", "))
    }
}
