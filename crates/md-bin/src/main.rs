//! marklight entrypoint.
use anyhow::{Context, Result};
use clap::Parser;
use core_config::{Config, load_from};
use core_diff::ChangeTracker;
use core_events::{EVENT_CHANNEL_CAP, Event, EventSourceRegistry, PreviewRefresher};
use core_images::{ChainResolver, ImageFetchCache};
use core_render::{Palette, SyntectTokenizer, Viewport};
use core_text::Buffer;
use crossterm::{cursor::MoveTo, queue, terminal::Clear, terminal::ClearType};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod sources;
mod view;

use sources::{FileWatchSource, ImageUpdateSource};
use view::{FrameInput, GUTTER_WIDTH, render_frame};

const LOG_FILE: &str = "marklight.log";
const FALLBACK_COLUMNS: usize = 120;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "marklight", version, about = "Markdown syntax highlighting preview")]
struct Args {
    /// Markdown file to highlight.
    pub path: PathBuf,
    /// Optional configuration file path (overrides discovery of `marklight.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// First visible line (0-based).
    #[arg(long, default_value_t = 0)]
    pub first_line: usize,
    /// Visible line count; the rest of the file (or the terminal height in watch mode) when omitted.
    #[arg(long)]
    pub lines: Option<usize>,
    /// First visible column (0-based).
    #[arg(long, default_value_t = 0)]
    pub first_column: usize,
    /// Visible column count; the terminal width when omitted.
    #[arg(long)]
    pub columns: Option<usize>,
    /// Text as last saved, for the since-save gutter (defaults to the original text).
    #[arg(long)]
    pub saved: Option<PathBuf>,
    /// Text as originally opened, for the since-original gutter (defaults to the file at startup).
    #[arg(long)]
    pub original: Option<PathBuf>,
    /// Resolve image references into the local image cache.
    #[arg(long)]
    pub images: bool,
    /// Re-render whenever the file changes.
    #[arg(long)]
    pub watch: bool,
    /// Print without syntax highlighting.
    #[arg(long)]
    pub no_highlight: bool,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join(LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(_) => Some(guard),
        // Global tracing subscriber already installed; drop guard so writer shuts down.
        Err(_err) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

struct Session {
    args: Args,
    path: PathBuf,
    config: Config,
    palette: Palette,
    tokenizer: SyntectTokenizer,
    tracker: ChangeTracker,
    images: Option<Arc<ImageFetchCache>>,
}

impl Session {
    fn load(args: Args, config: Config) -> Result<Self> {
        let path = std::fs::canonicalize(&args.path)
            .with_context(|| format!("opening {}", args.path.display()))?;
        let current = read_text(&path)?;
        let original = match &args.original {
            Some(p) => read_text(p)?,
            None => current.clone(),
        };
        let mut tracker = ChangeTracker::new(original);
        tracker.set_enabled(config.changes_enabled());
        if let Some(saved) = &args.saved {
            tracker.mark_saved(&read_text(saved)?);
        }

        let images = if args.images && config.images_enabled() {
            Some(ImageFetchCache::create(
                Arc::new(ChainResolver::standard()),
                Handle::current(),
            )?)
        } else {
            None
        };

        let config_path = config.path.as_ref().map(|p| p.display().to_string());
        info!(
            target: "runtime.startup",
            path = %path.display(),
            config = config_path.as_deref(),
            highlight = config.highlight_enabled() && !args.no_highlight,
            changes = config.changes_enabled(),
            images = images.is_some(),
            watch = args.watch,
            "bootstrap_complete"
        );

        Ok(Self {
            palette: config.palette(),
            tokenizer: SyntectTokenizer::default(),
            args,
            path,
            config,
            tracker,
            images,
        })
    }

    fn highlight(&self) -> bool {
        self.config.highlight_enabled() && !self.args.no_highlight
    }

    fn viewport(&self, buffer: &Buffer) -> Viewport {
        let terminal = crossterm::terminal::size().ok();
        let line_count = self.args.lines.unwrap_or_else(|| match terminal {
            Some((_, rows)) if self.args.watch && rows > 1 => rows as usize - 1,
            _ => buffer.line_count().saturating_sub(self.args.first_line),
        });
        let column_count = self.args.columns.unwrap_or_else(|| match terminal {
            Some((cols, _)) if cols as usize > GUTTER_WIDTH + 1 => cols as usize - GUTTER_WIDTH - 1,
            _ => FALLBACK_COLUMNS,
        });
        Viewport {
            first_line: self.args.first_line,
            line_count,
            first_column: self.args.first_column,
            column_count,
        }
    }

    /// Re-read the file, refresh change decorations and draw one frame.
    fn render<W: Write>(&mut self, out: &mut W, clear: bool) -> Result<()> {
        let text = read_text(&self.path)?;
        self.tracker.update(&text);
        let buffer = Buffer::new(self.path.display().to_string(), &text);
        let document = core_syntax::parse(&text);
        let input = FrameInput {
            buffer: &buffer,
            document: &document,
            tokenizer: &self.tokenizer,
            palette: &self.palette,
            decorations: self.tracker.decorations(),
            viewport: self.viewport(&buffer),
            highlight: self.highlight(),
        };
        let mut writer = render_frame(&input);

        if let Some(cache) = &self.images {
            let base = self.path.display().to_string();
            for uri in document.image_destinations(&text) {
                let resolved = if self.args.watch {
                    cache.resolve_async(&uri, &base)
                } else {
                    cache.resolve_sync(&uri, &base)
                };
                let status = match resolved {
                    Some(p) => p.display().to_string(),
                    None if self.args.watch => "pending".to_string(),
                    None => "unavailable".to_string(),
                };
                writer.print(format!("[image] {uri} -> {status}"));
                writer.new_line();
            }
        }

        if clear {
            queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        writer.flush_to(out)?;
        debug!(target: "runtime", lines = buffer.line_count(), "frame_rendered");
        Ok(())
    }

    fn shutdown(&self) {
        if let Some(cache) = &self.images {
            cache.shutdown();
        }
    }
}

async fn watch(session: &mut Session) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let mut refresher = PreviewRefresher::spawn(session.config.preview_interval(), &tx);
    let mut registry = EventSourceRegistry::new();
    registry.register(FileWatchSource::new(session.path.clone()));
    if let Some(cache) = &session.images {
        registry.register(ImageUpdateSource::new(cache.subscribe()));
    }
    let source_handles = registry.spawn_all(&tx);

    let mut stdout = io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!(target: "runtime", "ctrl_c");
                break;
            }
            event = rx.recv() => match event {
                Some(Event::PreviewRefresh) => {
                    if let Err(err) = session.render(&mut stdout, true) {
                        warn!(target: "runtime", error = %err, "render_failed");
                    }
                }
                Some(Event::SourceChanged(path)) => {
                    trace!(target: "runtime", path = %path.display(), "source_changed");
                    refresher.notify_edit();
                }
                Some(Event::ImageReady { uri, .. }) => {
                    trace!(target: "runtime", uri = %uri, "image_ready");
                    refresher.notify_edit();
                }
                Some(Event::Shutdown) | None => break,
            }
        }
    }

    refresher.stop().await;
    drop(tx);
    rx.close();
    for handle in source_handles {
        match tokio::time::timeout(Duration::from_millis(200), handle).await {
            Ok(Ok(_)) => trace!(target: "runtime.shutdown", "event_source_task_stopped"),
            Ok(Err(err)) if err.is_cancelled() => {
                trace!(target: "runtime.shutdown", "event_source_task_cancelled")
            }
            Ok(Err(err)) => error!(target: "runtime.shutdown", ?err, "event_source_task_error"),
            Err(_) => warn!(target: "runtime.shutdown", "event_source_task_timeout"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let config = load_from(args.config.clone())?;
    let mut session = Session::load(args, config)?;
    let result = if session.args.watch {
        watch(&mut session).await
    } else {
        session.render(&mut io::stdout(), false)
    };
    session.shutdown();
    info!(target: "runtime", ok = result.is_ok(), "shutdown");
    result
}
