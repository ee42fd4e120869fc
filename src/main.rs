//! pilot - 任务编排核心的 dry-run 入口
//!
//! 用法：`pilot [--config PATH] [--json] <objective...>`
//! 打印阶段计划，并用记录日志的 mock 后端执行（真实的桌面 / 浏览器执行器是外部协作者）。
//! Ctrl+C 在下一个阶段边界取消运行。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use pilot::{
    backend::{BackendRegistry, MockBackend, MockUploadTarget, UploadCoordinator, UploadTarget},
    config::load_config,
    core::BackendKind,
    observability,
    resolver::FileResolver,
    router::Orchestrator,
};

const USAGE: &str = "Usage: pilot [--config PATH] [--json] <objective...>";

struct Args {
    config: Option<PathBuf>,
    json: bool,
    objective: String,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Option<Args>> {
    let mut config = None;
    let mut json = false;
    let mut words = Vec::new();

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--json" => json = true,
            "--config" => match raw.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path\n{USAGE}"),
            },
            "--" => {
                words.extend(raw.by_ref());
            }
            flag if flag.starts_with("--") => bail!("unknown option: {flag}\n{USAGE}"),
            _ => words.push(arg),
        }
    }

    let objective = words.join(" ");
    if objective.trim().is_empty() {
        bail!("missing objective\n{USAGE}");
    }
    Ok(Some(Args {
        config,
        json,
        objective,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let Some(args) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let cfg = load_config(args.config).context("Failed to load config")?;
    let scope = cfg.search_scope()?;

    let resolver = Arc::new(FileResolver::new(cfg.resolver_settings()));
    let coordinator = Arc::new(UploadCoordinator::new(resolver, scope, cfg.candidate_roots()));
    let upload_target: Arc<dyn UploadTarget> = Arc::new(MockUploadTarget::new());

    let backends = BackendRegistry::new()
        .with(Arc::new(
            MockBackend::succeeding(BackendKind::Desktop).named("desktop-dry-run"),
        ))
        .with(Arc::new(
            MockBackend::succeeding(BackendKind::Browser)
                .named("browser-dry-run")
                .with_uploads(coordinator, upload_target),
        ));

    let orchestrator = Orchestrator::new(backends, cfg.router_settings())
        .with_classifier(cfg.classifier())
        .with_decomposer(cfg.decomposer());

    if !args.json {
        println!("Plan:");
        for phase in orchestrator.plan(&args.objective) {
            println!(
                "  [{}] {:<10} {:.2}  {}",
                phase.index, phase.task_type, phase.classification.confidence, phase.text
            );
        }
    }

    let supervisor = orchestrator.supervisor().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling at next phase boundary");
            supervisor.cancel();
        }
    });

    let report = orchestrator
        .run(args.objective.as_str())
        .await
        .context("Run failed")?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}
