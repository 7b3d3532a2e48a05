use super::Deployment;
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use provision::{Graph, Ledger};

/// What a run would do to one resource, judged from the recorded state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    /// Created earlier but never became ready; the gate is re-run
    Await,
    Keep,
    Destroy,
    Skip,
}

impl Action {
    fn marker(self) -> colored::ColoredString {
        match self {
            Self::Create => "+".green(),
            Self::Await => "~".yellow(),
            Self::Keep | Self::Skip => "=".dimmed(),
            Self::Destroy => "-".red(),
        }
    }
}

/// Resources in execution order with the action each would get
pub fn actions<'a>(graph: &'a Graph, ledger: &Ledger, destroy: bool) -> Vec<(&'a str, Action)> {
    if destroy {
        graph
            .destroy_order()
            .into_iter()
            .map(|name| {
                let action = if ledger.contains(name) {
                    Action::Destroy
                } else {
                    Action::Skip
                };
                (name, action)
            })
            .collect()
    } else {
        graph
            .apply_order()
            .into_iter()
            .map(|name| {
                let action = match ledger.get(name) {
                    None => Action::Create,
                    Some(record) if record.pending => Action::Await,
                    Some(_) => Action::Keep,
                };
                (name, action)
            })
            .collect()
    }
}

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let deployment = Deployment::load(ctx)?;
    let graph = &deployment.graph;
    let ledger = &deployment.state.ledger;

    ui::header(if args.destroy { "Destroy plan" } else { "Apply plan" });
    deployment.print_location();
    println!();

    let actions = actions(graph, ledger, args.destroy);
    for (name, action) in &actions {
        let kind = graph
            .descriptor(name)
            .map(|d| d.kind.to_string())
            .unwrap_or_default();
        let deps = graph.dependencies_of(name);
        if ctx.verbose > 0 && !deps.is_empty() {
            println!(
                "  {} {} {} {}",
                action.marker(),
                name,
                kind.dimmed(),
                format!("after {}", deps.join(", ")).dimmed()
            );
        } else {
            println!("  {} {} {}", action.marker(), name, kind.dimmed());
        }
    }

    let count = |wanted: Action| actions.iter().filter(|(_, a)| *a == wanted).count();
    println!();
    if args.destroy {
        ui::info(&format!(
            "{} to destroy, {} not recorded",
            count(Action::Destroy),
            count(Action::Skip)
        ));
    } else {
        ui::info(&format!(
            "{} to create, {} awaiting readiness, {} recorded",
            count(Action::Create),
            count(Action::Await),
            count(Action::Keep)
        ));
        ui::dim("Recorded resources whose inputs changed are detected during apply.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::topology;
    use provision::{AppliedResource, ResourceKind};

    fn graph() -> Graph {
        let config = Config::parse("[platform]\norganization_id = \"org-1\"\n").unwrap();
        topology::build(&config).unwrap()
    }

    fn record(pending: bool) -> AppliedResource {
        AppliedResource {
            kind: ResourceKind::Environment,
            fingerprint: String::new(),
            pending,
            outputs: Vec::new(),
        }
    }

    #[test]
    fn test_fresh_plan_creates_everything_in_order() {
        let graph = graph();
        let actions = actions(&graph, &Ledger::new(), false);
        assert_eq!(actions.len(), graph.len());
        assert!(actions.iter().all(|(_, a)| *a == Action::Create));
        let names: Vec<&str> = actions.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, graph.apply_order());
    }

    #[test]
    fn test_plan_marks_recorded_and_pending() {
        let graph = graph();
        let mut ledger = Ledger::new();
        ledger.resources.insert("dr-east-env".into(), record(false));
        ledger.resources.insert("dr-east-cluster".into(), record(true));

        let actions = actions(&graph, &ledger, false);
        let of = |name: &str| actions.iter().find(|(n, _)| *n == name).map(|(_, a)| *a);
        assert_eq!(of("dr-east-env"), Some(Action::Keep));
        assert_eq!(of("dr-east-cluster"), Some(Action::Await));
        assert_eq!(of("dr-west-env"), Some(Action::Create));
    }

    #[test]
    fn test_destroy_plan_skips_unrecorded() {
        let graph = graph();
        let mut ledger = Ledger::new();
        ledger.resources.insert("dr-east-env".into(), record(false));

        let actions = actions(&graph, &ledger, true);
        let names: Vec<&str> = actions.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, graph.destroy_order());
        let destroyed: Vec<&str> = actions
            .iter()
            .filter(|(_, a)| *a == Action::Destroy)
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(destroyed, vec!["dr-east-env"]);
    }
}
