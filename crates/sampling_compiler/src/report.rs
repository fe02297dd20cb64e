//! Human-readable reconciliation report.
//!
//! Explains which processors a namespace compiled into and why each sampling
//! resource did or did not make it there.

use crate::policy::{ProbabilisticSamplerSettings, TailSamplingConfig};
use crate::processor::{Processor, GLOBAL_SAMPLING, PROBABILISTIC_SAMPLER, TAIL_SAMPLING};
use crate::reconciler::ReconcileReport;
use crate::rules::{Rule, SamplingRulesConfig};
use sampling_actions::ConditionStatus;

/// Generates a markdown report for one reconciled namespace.
#[must_use]
pub fn generate_report(report: &ReconcileReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Sampling Report: {}\n\n", report.namespace));

    out.push_str("## Overview\n\n");
    out.push_str(&format!("- **Tail sampling**: {}\n", report.topology));
    out.push_str(&format!("- **Processors**: {}\n", report.applied.len()));
    out.push_str(&format!("- **Resources**: {}\n", report.conditions.len()));
    if !report.migration.created.is_empty() {
        out.push_str(&format!(
            "- **Migrated**: {}\n",
            report
                .migration
                .created
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if report.status_failures > 0 {
        out.push_str(&format!(
            "- **Status update failures**: {}\n",
            report.status_failures
        ));
    }
    out.push('\n');

    out.push_str("## Processors\n\n");
    if report.applied.is_empty() {
        out.push_str("No processors.\n\n");
    }
    for applied in &report.applied {
        let processor = &applied.processor;
        let spec = &processor.spec;
        out.push_str(&format!(
            "### {} (`{}`, {})\n\n",
            processor.name(),
            spec.processor_type,
            applied.outcome
        ));
        out.push_str(&format!("- **Order hint**: {}\n", spec.order_hint));
        out.push_str(&format!(
            "- **Collector roles**: {}\n",
            spec.collector_roles
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        out.push_str(&format!(
            "- **Owners**: {}\n",
            processor
                .owners()
                .iter()
                .map(|o| o.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        for line in describe_config(processor) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }

    if !report.deleted.is_empty() {
        out.push_str("## Deleted\n\n");
        for name in &report.deleted {
            out.push_str(&format!("- {}\n", name));
        }
        out.push('\n');
    }

    out.push_str("## Resources\n\n");
    if report.conditions.is_empty() {
        out.push_str("No sampling resources.\n");
        return out;
    }
    out.push_str("| Resource | Compiled | Reason | Message |\n");
    out.push_str("|----------|----------|--------|---------|\n");
    for (target, condition) in &report.conditions {
        let mark = match condition.status {
            ConditionStatus::True => "yes",
            ConditionStatus::False => "no",
            ConditionStatus::Unknown => "?",
        };
        out.push_str(&format!(
            "| {}/{} | {} | {} | {} |\n",
            target.kind, target.name, mark, condition.reason, condition.message
        ));
    }

    out
}

fn rule_names(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return "none".to_string();
    }
    rules
        .iter()
        .map(|r| format!("`{}` ({})", r.name, r.rule_type().as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_config(processor: &Processor) -> Vec<String> {
    let config = processor.spec.config.clone();
    let name = processor.name();

    if name == GLOBAL_SAMPLING.name {
        let Ok(rules) = serde_json::from_value::<SamplingRulesConfig>(config) else {
            return vec!["- **Config**: unreadable".to_string()];
        };
        vec![
            format!("- **Global rules**: {}", rule_names(&rules.global_rules)),
            format!("- **Service rules**: {}", rule_names(&rules.service_rules)),
            format!("- **Endpoint rules**: {}", rule_names(&rules.endpoint_rules)),
        ]
    } else if name == TAIL_SAMPLING.name {
        let Ok(tail) = serde_json::from_value::<TailSamplingConfig>(config) else {
            return vec!["- **Config**: unreadable".to_string()];
        };
        tail.policies
            .iter()
            .map(|p| {
                format!(
                    "- **Policy** `{}`: {} ({})",
                    p.name,
                    p.policy_type(),
                    p.details.selection_key()
                )
            })
            .collect()
    } else if name == PROBABILISTIC_SAMPLER.name {
        let Ok(settings) = serde_json::from_value::<ProbabilisticSamplerSettings>(config) else {
            return vec!["- **Config**: unreadable".to_string()];
        };
        vec![format!(
            "- **Sampling percentage**: {:.1}%",
            settings.sampling_percentage
        )]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::handlers::fixtures::{error_action, legacy_error, probabilistic_action};
    use crate::reconciler::Reconciler;
    use crate::store::{MemoryStore, ResourceStore};

    #[test]
    fn report_lists_processors_and_resources() {
        let store = MemoryStore::new();
        store.create_action(error_action("errors", 10.0)).unwrap();
        store.create_action(error_action("broken", 150.0)).unwrap();
        store.create_action(probabilistic_action("tenth", "10")).unwrap();
        store.insert_legacy(legacy_error("old", 5.0)).unwrap();

        let reconciled = Reconciler::new(&store, CompilerConfig::default())
            .reconcile("shop")
            .unwrap();
        let report = generate_report(&reconciled);

        assert!(report.contains("# Sampling Report: shop"));
        assert!(report.contains("- **Tail sampling**: probabilistic-only"));
        assert!(report.contains("- **Migrated**: errorsampler-old"));
        assert!(report.contains("### sampling-rules (`odigossampling`, created)"));
        assert!(report.contains("`errors` (error)"));
        assert!(report.contains("- **Sampling percentage**: 10.0%"));
        assert!(report.contains("| Action/broken | no | InvalidConfig |"));
        assert!(report.contains("| Action/tenth | yes | ProcessorCreated |"));
    }

    #[test]
    fn empty_namespace_report() {
        let store = MemoryStore::new();
        let reconciled = Reconciler::new(&store, CompilerConfig::default())
            .reconcile("empty")
            .unwrap();
        let report = generate_report(&reconciled);
        assert!(report.contains("No processors."));
        assert!(report.contains("No sampling resources."));
    }
}
