use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capture::ChromeCapturer;
use crate::config::{Config, Credentials, init};
use crate::diff::{Annotator, compute_difference, difference_image, load_snapshot};
use crate::monitor::Orchestrator;
use crate::notify::{BrevoNotifier, Notifier};

const MAX_CONSECUTIVE_ERRORS: u32 = 10;

#[derive(Parser)]
#[command(name = "page-watcher")]
#[command(about = "网页截图变化监控工具", long_about = None)]
#[command(version)]
pub struct Cli {
    /// 配置文件路径(默认使用用户配置目录下的 page-watcher/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 日志等级 (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Clone, Default)]
pub struct TargetOverrides {
    /// 覆盖配置中的目标 URL
    #[arg(long)]
    pub url: Option<String>,

    /// 覆盖配置中的目标名称
    #[arg(long)]
    pub name: Option<String>,

    /// 覆盖配置中的截图目录
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

impl TargetOverrides {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.target.url = url.clone();
        }
        if let Some(name) = &self.name {
            config.target.name = name.clone();
        }
        if let Some(dir) = &self.dir {
            config.target.screenshot_dir = dir.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 执行一次: 截图、比较、有变化时标注并发送邮件
    Run {
        #[command(flatten)]
        overrides: TargetOverrides,
    },

    /// 按固定间隔循环执行,直到 Ctrl-C
    Watch {
        #[command(flatten)]
        overrides: TargetOverrides,

        /// 覆盖配置中的间隔(秒)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// 离线比较两张图片
    Compare {
        previous: PathBuf,
        current: PathBuf,

        /// 有差异时写出标注图片的路径
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 写出逐通道绝对差图像的路径
        #[arg(long)]
        raw_diff: Option<PathBuf>,
    },
}

/// CLI 入口函数
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { overrides } => {
            let config = load_config(cli.config, cli.log_level.as_deref(), &overrides)?;
            run_once(config).await?;
        }
        Commands::Watch {
            overrides,
            interval,
        } => {
            let mut config = load_config(cli.config, cli.log_level.as_deref(), &overrides)?;
            if let Some(secs) = interval {
                config.watch.interval_secs = secs;
                config.validate()?;
            }
            watch(config).await?;
        }
        Commands::Compare {
            previous,
            current,
            output,
            raw_diff,
        } => {
            let (config, source) = compare_config(cli.config)?;
            init::init(&config.logging, cli.log_level.as_deref());
            match source {
                Some(path) => info!("Loaded config from {}", path.display()),
                None => info!("No config file found, using default highlight settings"),
            }
            let annotator = Annotator::new(&config.highlight);
            compare(previous, current, output, raw_diff, &annotator)?;
        }
    }

    Ok(())
}

/// 加载配置并初始化日志,命令行参数覆盖配置文件
fn load_config(
    path: Option<PathBuf>,
    log_level: Option<&str>,
    overrides: &TargetOverrides,
) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    let mut config = Config::load_from(&path)?;
    overrides.apply(&mut config);
    config.validate()?;

    init::init(&config.logging, log_level);
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// `compare` 只用到高亮和日志配置
///
/// 显式指定的配置文件必须能读取;否则默认路径存在时读取,不存在时使用默认值。
/// 返回配置及其来源文件。
fn compare_config(path: Option<PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = path {
        return Ok((Config::load_from(&path)?, Some(path)));
    }
    match Config::default_config_path() {
        Ok(path) if path.is_file() => Ok((Config::load_from(&path)?, Some(path))),
        _ => Ok((Config::default(), None)),
    }
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let notifier: Option<Box<dyn Notifier>> = if config.email.enable {
        let credentials = Credentials::from_env(&config.email)?;
        let notifier = BrevoNotifier::new(&config.email, credentials)
            .context("Failed to build email client")?;
        Some(Box::new(notifier))
    } else {
        None
    };

    Ok(Orchestrator::new(
        config.target.clone(),
        Box::new(ChromeCapturer::new(config.browser.clone())),
        notifier,
        Annotator::new(&config.highlight),
    ))
}

async fn run_once(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    info!(
        "Snapshot slots: {} / {}",
        orchestrator.paths().previous.display(),
        orchestrator.paths().current.display()
    );
    let report = orchestrator.run_once().await?;
    println!("{}", report);
    Ok(())
}

async fn watch(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let interval = Duration::from_secs(config.watch.interval_secs);
    let cancel_token = CancellationToken::new();

    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping after current run");
            ctrl_c_token.cancel();
        }
    });

    watch_loop(&orchestrator, interval, cancel_token).await?;

    println!("Stopped watching {}", config.target.url);
    Ok(())
}

/// 循环执行直到取消
///
/// 取消只在两次运行之间生效,进行中的运行总会完成。
/// 连续失败 `MAX_CONSECUTIVE_ERRORS` 次后返回错误。
async fn watch_loop(
    orchestrator: &Orchestrator,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    let target = orchestrator.target();
    info!("Watching {} every {}s", target.url, interval.as_secs());

    let mut consecutive_errors = 0;
    loop {
        match orchestrator.run_once().await {
            Ok(report) => {
                consecutive_errors = 0;
                if report.outcome.is_changed() {
                    warn!("Change detected on {}", report.url);
                }
                info!(
                    "Run for {} finished in {}ms",
                    report.target,
                    (report.finished_at - report.started_at).num_milliseconds()
                );
                println!(
                    "[{}] {}: {}",
                    report.finished_at.format("%Y-%m-%d %H:%M:%S"),
                    report.target,
                    report
                );
            }
            Err(e) => {
                consecutive_errors += 1;
                error!(
                    "Run failed for {} ({}/{}): {}",
                    target.name, consecutive_errors, MAX_CONSECUTIVE_ERRORS, e
                );

                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    anyhow::bail!(
                        "Exceeded max consecutive errors ({}), last error: {}",
                        MAX_CONSECUTIVE_ERRORS,
                        e
                    );
                }
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = cancel_token.cancelled() => {
                info!("Watch cancelled during interval");
                break;
            }
        }
    }

    Ok(())
}

fn compare(
    previous: PathBuf,
    current: PathBuf,
    output: Option<PathBuf>,
    raw_diff: Option<PathBuf>,
    annotator: &Annotator,
) -> Result<()> {
    let prev = load_snapshot(&previous)?
        .with_context(|| format!("Image not found: {}", previous.display()))?;
    let curr = load_snapshot(&current)?
        .with_context(|| format!("Image not found: {}", current.display()))?;

    if let Some(raw_diff) = raw_diff {
        difference_image(&prev, &curr)
            .save(&raw_diff)
            .with_context(|| format!("Failed to save {}", raw_diff.display()))?;
        println!("Saved difference image: {}", raw_diff.display());
    }

    let result = compute_difference(&prev, &curr);
    let Some(bbox) = result.bounding_box else {
        println!("No change detected.");
        return Ok(());
    };

    if result.dimensions_changed {
        warn!("Images have different dimensions");
    }
    println!(
        "Change detected: {} pixels within {}",
        result.changed_pixels, bbox
    );

    if let Some(output) = output {
        annotator.write(&curr, &bbox, &output)?;
        println!("Saved highlighted diff image: {}", output.display());
    }

    Ok(())
}
