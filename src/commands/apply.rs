use super::outputs::print_export;
use super::{Deployment, confirm, connect, finish, print_report};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::RunProgress;
use crate::signal::InterruptGuard;
use crate::ui;
use anyhow::Result;
use provision::{RunStatus, Scheduler};
use std::sync::Arc;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut deployment = Deployment::load(ctx)?;
    let platform = connect(&deployment.config, &args.credentials)?;

    ui::header("Apply");
    deployment.print_location();
    let ledger = &deployment.state.ledger;
    let missing = deployment
        .graph
        .apply_order()
        .into_iter()
        .filter(|name| ledger.get(name).is_none_or(|r| r.pending))
        .count();
    ui::kv(
        "Resources",
        &format!("{} total, {} to create", deployment.graph.len(), missing),
    );
    println!();

    if !confirm("Provision the DR topology?", args.yes)? {
        ui::info("Aborted. No changes made.");
        return Ok(());
    }

    let options = deployment
        .config
        .schedule_options(args.jobs, args.replace_changed);
    let scheduler = Scheduler::new(Arc::new(platform), options);
    let guard = InterruptGuard::install(scheduler.cancel_token());
    let mut progress = RunProgress::new(ctx.quiet);
    let result = scheduler.apply(&deployment.graph, &deployment.state.ledger, &mut progress);
    let interrupted = guard.interrupted();
    drop(guard);
    if interrupted {
        ui::warn("Interrupted: in-flight operations were allowed to finish");
    }

    let outcome = result?;
    deployment.record(&outcome)?;
    print_report(ctx, &outcome);

    if outcome.status() == RunStatus::Complete && !ctx.quiet {
        ui::section("Outputs");
        print_export(&outcome.export(true));
    }
    finish("Apply", &outcome.report)
}
