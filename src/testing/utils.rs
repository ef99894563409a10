use crate::error::{ProgressionError, Result};

pub fn extract_unique_groups(group_ids: &[usize]) -> Vec<usize> {
    let mut unique_groups = group_ids.to_vec();
    unique_groups.sort();
    unique_groups.dedup();
    unique_groups
}

/// Resolve the two condition levels of a design, in ascending id order.
///
/// The first level is the one whose weighted mean is subtracted from, so relabelling the
/// conditions flips the sign of every difference statistic.
pub fn two_levels(group_ids: &[usize]) -> Result<(usize, usize)> {
    let unique_groups = extract_unique_groups(group_ids);
    if unique_groups.len() != 2 {
        return Err(ProgressionError::LevelCount {
            found: unique_groups.len(),
        });
    }
    Ok((unique_groups[0], unique_groups[1]))
}

pub fn check_label_length(group_ids: &[usize], n_cells: usize) -> Result<()> {
    if group_ids.len() != n_cells {
        return Err(ProgressionError::DimensionMismatch {
            what: "condition labels",
            expected: n_cells,
            got: group_ids.len(),
        });
    }
    Ok(())
}

/// Categorical condition labels encoded as dense group ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionLabels {
    levels: Vec<String>,
    group_ids: Vec<usize>,
}

impl ConditionLabels {
    /// Encode names so that ids follow the sorted order of the distinct names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut levels: Vec<String> = names.iter().map(|s| s.as_ref().to_string()).collect();
        levels.sort();
        levels.dedup();

        let group_ids = names
            .iter()
            .map(|s| {
                // levels holds every name, so the search always succeeds
                levels
                    .binary_search_by(|level| level.as_str().cmp(s.as_ref()))
                    .unwrap_or_default()
            })
            .collect();

        ConditionLabels { levels, group_ids }
    }

    pub fn group_ids(&self) -> &[usize] {
        &self.group_ids
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Name of a group id, if the id is one of the encoded levels.
    pub fn level_name(&self, group_id: usize) -> Option<&str> {
        self.levels.get(group_id).map(String::as_str)
    }

    /// Reword an error that points at a condition id using the condition's name.
    ///
    /// Returns `None` for errors that do not involve a single condition, or whose id is not one of
    /// the encoded levels.
    pub fn describe(&self, err: &ProgressionError) -> Option<String> {
        match err {
            ProgressionError::UndefinedWeightedMean { label } => {
                self.level_name(*label).map(|name| {
                    format!("Undefined weighted mean: condition '{}' has zero total weight", name)
                })
            }
            ProgressionError::NonFiniteMean { label } => self
                .level_name(*label)
                .map(|name| format!("Weighted mean for condition '{}' is not finite", name)),
            _ => None,
        }
    }
}
