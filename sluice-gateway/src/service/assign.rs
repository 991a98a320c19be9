//! Batch Assigner
//!
//! Spreads a burst of same-typed submissions across the members of the
//! requested model's quota bucket so they do not all queue behind one pacing
//! gap. Assignment is deterministic: same input order and configuration,
//! same result.

use std::collections::HashMap;

use sluice_core::config::{GatewayConfig, Result};

/// Maps each requested alias in a batch to a concrete model.
pub struct BatchAssigner<'a> {
    config: &'a GatewayConfig,
}

impl<'a> BatchAssigner<'a> {
    pub fn new(config: &'a GatewayConfig) -> Self {
        Self { config }
    }

    /// Resolves a batch of requested aliases into concrete model names,
    /// order-preserving relative to the input.
    ///
    /// Within a bucket the first k jobs land on k distinct members — the
    /// first job's requested alias first, then the remaining members in
    /// configured bucket order — and any excess wraps around from the start,
    /// so spread is maximal under the bucket's capacity. Buckets never
    /// interact. An unknown alias fails the whole batch before any row is
    /// created.
    pub fn assign(&self, aliases: &[String]) -> Result<Vec<String>> {
        // Validate every alias up front so a bad entry cannot half-assign
        for alias in aliases {
            self.config.resolve(alias)?;
        }

        // Per-bucket rotation order and a cursor into it
        let mut rotations: HashMap<String, Vec<&str>> = HashMap::new();
        let mut cursors: HashMap<String, usize> = HashMap::new();

        let mut assigned = Vec::with_capacity(aliases.len());
        for alias in aliases {
            // An alias outside any bucket behaves like a one-member bucket
            let Some(bucket) = self.config.bucket_for(alias) else {
                assigned.push(self.config.resolve(alias)?.to_string());
                continue;
            };

            if bucket.members.len() == 1 {
                assigned.push(self.config.resolve(alias)?.to_string());
                continue;
            }

            let rotation = rotations.entry(bucket.name.clone()).or_insert_with(|| {
                // Requested alias leads, the rest keep their configured order
                let mut order: Vec<&str> = Vec::with_capacity(bucket.members.len());
                order.push(alias.as_str());
                order.extend(
                    bucket
                        .members
                        .iter()
                        .map(String::as_str)
                        .filter(|m| *m != alias.as_str()),
                );
                order
            });

            let cursor = cursors.entry(bucket.name.clone()).or_insert(0);
            let member = rotation[*cursor % rotation.len()];
            *cursor += 1;

            assigned.push(self.config.resolve(member)?.to_string());
        }

        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn different_buckets_keep_requested_models() {
        let config = GatewayConfig::default();
        let assigner = BatchAssigner::new(&config);

        let assigned = assigner.assign(&aliases(&["fast", "think"])).unwrap();
        assert_eq!(assigned, vec!["gemini-2.5-flash", "gemini-2.5-pro"]);
    }

    #[test]
    fn same_bucket_pair_is_spread() {
        let config = GatewayConfig::default();
        let assigner = BatchAssigner::new(&config);

        let assigned = assigner.assign(&aliases(&["fast", "fast"])).unwrap();
        assert_eq!(assigned.len(), 2);
        assert_ne!(assigned[0], assigned[1], "both got {}", assigned[0]);
        // The first job keeps its requested model
        assert_eq!(assigned[0], "gemini-2.5-flash");
        // Both stay inside the flash bucket
        for model in &assigned {
            let alias = config.alias_for(model).unwrap();
            assert_eq!(config.bucket_for(alias).unwrap().name, "flash");
        }
    }

    #[test]
    fn overflow_wraps_around_the_bucket() {
        let config = GatewayConfig::default();
        let assigner = BatchAssigner::new(&config);

        // Flash bucket has 3 members; the 4th job must reuse one
        let assigned = assigner
            .assign(&aliases(&["fast", "fast", "fast", "fast"]))
            .unwrap();
        let unique: std::collections::HashSet<&String> = assigned.iter().collect();
        assert_eq!(unique.len(), 3, "expected 3 distinct models, got {:?}", assigned);
        assert_eq!(assigned[3], assigned[0]);
    }

    #[test]
    fn single_member_bucket_passes_through() {
        let config = GatewayConfig::default();
        let assigner = BatchAssigner::new(&config);

        let assigned = assigner
            .assign(&aliases(&["think", "think", "think"]))
            .unwrap();
        assert!(assigned.iter().all(|m| m == "gemini-2.5-pro"));
    }

    #[test]
    fn assignment_is_deterministic() {
        let config = GatewayConfig::default();
        let assigner = BatchAssigner::new(&config);
        let input = aliases(&["fast", "lite", "fast", "think", "fast"]);

        let first = assigner.assign(&input).unwrap();
        let second = assigner.assign(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_alias_rejects_whole_batch() {
        let config = GatewayConfig::default();
        let assigner = BatchAssigner::new(&config);

        assert!(assigner.assign(&aliases(&["fast", "bogus"])).is_err());
    }
}
