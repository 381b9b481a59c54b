//! Bake configuration: tolerances and naming used by the baking passes.

use serde::{Deserialize, Serialize};

/// Suffix appended to the source action name to form the baked action name.
pub const BAKED_SUFFIX: &str = "_B4W_BAKED";

/// Tunables for skeletal baking and curve optimization.
///
/// Defaults reproduce the exporter's historical thresholds. They are expressed
/// in scene units (translation) and unitless quaternion/scale values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Suffix for baked action names.
    pub baked_suffix: String,
    /// Bake only bones that deform or have a deforming descendant.
    pub only_deform_bones: bool,
    /// Run key cleaning before dead-channel removal.
    pub clean_keys: bool,
    /// Value threshold for key cleaning.
    pub clean_threshold: f64,
    /// Distance from identity under which a static channel is dropped.
    pub identity_epsilon: f64,
    /// Distance from the P1P2 line under which P3 counts as collinear.
    pub linear_tolerance: f64,
    /// Diagonal bias tried when a matrix is exactly singular.
    pub inverse_bias: f64,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            baked_suffix: BAKED_SUFFIX.to_string(),
            only_deform_bones: false,
            clean_keys: true,
            clean_threshold: 1e-3,
            identity_epsilon: 1e-4,
            linear_tolerance: 1e-4,
            inverse_bias: 1e-8,
        }
    }
}

impl BakeConfig {
    /// Name of the baked counterpart of `action`.
    pub fn baked_name(&self, action: &str) -> String {
        format!("{action}{}", self.baked_suffix)
    }

    /// Whether `action` already is a baked action.
    pub fn is_baked_name(&self, action: &str) -> bool {
        !self.baked_suffix.is_empty() && action.contains(&self.baked_suffix)
    }
}
