//! List command - show what a run would do

use crate::testing::TestPlan;
use colored::*;

/// Print the planned services, targets and cases
pub fn run(plan: &TestPlan) {
    if plan.is_empty() {
        println!("{}", "No tests found.".yellow());
        return;
    }

    if !plan.services.is_empty() {
        println!("{}", "Services:".bold());
        for service in &plan.services {
            let source = service
                .image
                .clone()
                .or_else(|| service.command.as_ref().map(|c| c.to_string()))
                .unwrap_or_default();
            println!("  {} {} ({})", service.name, source.dimmed(), service.health.label());
        }
    }

    if !plan.targets.is_empty() {
        println!("{}", "Targets:".bold());
        for target in &plan.targets {
            println!("  {} {}", target.name, target.platform().dimmed());
        }
    }

    println!("{}", "Tests:".bold());
    for case in &plan.runnable {
        match &case.skip {
            Some(reason) => println!("  {} {}", case.id, format!("(skipped: {})", reason).cyan()),
            None => println!("  {}", case.id),
        }
    }

    if !plan.unsatisfied.is_empty() {
        println!("{}", "Not runnable:".red().bold());
        for error in &plan.unsatisfied {
            println!("  {}", error);
        }
    }

    println!();
    println!(
        "{} test{}, {} runnable",
        plan.total().to_string().bold(),
        if plan.total() == 1 { "" } else { "s" },
        plan.runnable.len()
    );
}
