use super::{Deployment, confirm, connect, finish, print_report};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::RunProgress;
use crate::signal::InterruptGuard;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use provision::Scheduler;
use std::sync::Arc;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let mut deployment = Deployment::load(ctx)?;
    if deployment.state.ledger.is_empty() {
        ui::info("Nothing recorded in the state, nothing to destroy.");
        return Ok(());
    }
    let platform = connect(&deployment.config, &args.credentials)?;

    ui::header("Destroy");
    deployment.print_location();
    ui::kv(
        "Resources",
        &format!("{} recorded", deployment.state.ledger.len()),
    );
    println!();
    ui::warn(&format!(
        "This deletes both regions of {} including topics and their data.",
        deployment.config.topology.prefix.bold()
    ));

    if !confirm("Destroy the DR topology?", args.yes)? {
        ui::info("Aborted. No changes made.");
        return Ok(());
    }

    let options = deployment.config.schedule_options(args.jobs, false);
    let scheduler = Scheduler::new(Arc::new(platform), options);
    let guard = InterruptGuard::install(scheduler.cancel_token());
    let mut progress = RunProgress::new(ctx.quiet);
    let result = scheduler.destroy(&deployment.graph, &deployment.state.ledger, &mut progress);
    let interrupted = guard.interrupted();
    drop(guard);
    if interrupted {
        ui::warn("Interrupted: in-flight operations were allowed to finish");
    }

    let outcome = result?;
    deployment.record(&outcome)?;
    print_report(ctx, &outcome);
    finish("Destroy", &outcome.report)
}
