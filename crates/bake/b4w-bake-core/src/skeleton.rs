//! Bone hierarchy used by the skeletal baker.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::BakeError;
use crate::math::Mat4;

/// A single bone. `rest_matrix` is the armature-space rest transform
/// (Blender's `matrix_local`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub rest_matrix: Mat4,
    /// Index of the parent bone; parents always precede their children.
    pub parent: Option<usize>,
    #[serde(default = "default_true")]
    pub use_deform: bool,
}

fn default_true() -> bool {
    true
}

impl Bone {
    pub fn new(name: impl Into<String>, rest_matrix: Mat4, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            rest_matrix,
            parent,
            use_deform: true,
        }
    }

    pub fn with_deform(mut self, use_deform: bool) -> Self {
        self.use_deform = use_deform;
        self
    }
}

/// Ordered bone set. Construction validates that parent links point
/// backwards, which rules out cycles, and that names are unique.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Skeleton {
    bones: Vec<Bone>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Result<Self, BakeError> {
        let mut by_name = HashMap::with_capacity(bones.len());
        for (idx, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= idx {
                    return Err(BakeError::InvalidSkeleton {
                        reason: format!(
                            "bone '{}' references parent {parent} which does not precede it",
                            bone.name
                        ),
                    });
                }
            }
            if by_name.insert(bone.name.clone(), idx).is_some() {
                return Err(BakeError::InvalidSkeleton {
                    reason: format!("duplicate bone name '{}'", bone.name),
                });
            }
        }
        Ok(Self { bones, by_name })
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, idx: usize) -> &Bone {
        &self.bones[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Direct children of `idx`, in skeleton order.
    pub fn children(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.parent == Some(idx))
            .map(|(i, _)| i)
    }

    /// For every bone: does it deform, or does any descendant deform?
    ///
    /// Computed in one reverse pass: children come after parents, so by the
    /// time a bone is visited all of its descendants have been folded in.
    pub fn deform_mask(&self) -> Vec<bool> {
        let mut mask: Vec<bool> = self.bones.iter().map(|b| b.use_deform).collect();
        for idx in (0..self.bones.len()).rev() {
            if mask[idx] {
                if let Some(parent) = self.bones[idx].parent {
                    mask[parent] = true;
                }
            }
        }
        mask
    }
}

impl<'de> Deserialize<'de> for Skeleton {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            bones: Vec<Bone>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Skeleton::new(raw.bones).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bone(name: &str, parent: Option<usize>, deform: bool) -> Bone {
        Bone::new(name, Mat4::identity(), parent).with_deform(deform)
    }

    #[test]
    fn rejects_forward_parent_links() {
        let err = Skeleton::new(vec![bone("a", Some(1), true), bone("b", None, true)]).unwrap_err();
        assert!(matches!(err, BakeError::InvalidSkeleton { .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Skeleton::new(vec![bone("a", None, true), bone("a", Some(0), true)]).unwrap_err();
        assert!(matches!(err, BakeError::InvalidSkeleton { .. }));
    }

    #[test]
    fn deform_mask_propagates_to_ancestors() {
        // root -> ctrl -> finger(deform), root -> ik_target (no deform, leaf)
        let skel = Skeleton::new(vec![
            bone("root", None, false),
            bone("ctrl", Some(0), false),
            bone("finger", Some(1), true),
            bone("ik_target", Some(0), false),
        ])
        .unwrap();
        assert_eq!(skel.deform_mask(), vec![true, true, true, false]);
        assert_eq!(skel.children(0).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(skel.index_of("finger"), Some(2));
    }
}
