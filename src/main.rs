use std::fs::File;
use std::io::{BufRead, Write as _, stdin, stdout};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};

use pokazka::nav::NavController;
use pokazka::overlay::{NullBackend, OverlayManager};
use pokazka::render::{Bitmap, BitmapCache, PrerenderScheduler, Purpose, RenderKey};
use pokazka::settings;
use pokazka::timer::{TalkTimer, format_clock};
use pokazka::ui::{Presenter, Surface};

#[derive(Parser)]
#[command(name = "pokazka", about = "Dual-screen presentation viewer core")]
struct Args {
    /// Presentation file to open
    file: PathBuf,

    /// Render worker threads (default: sized from the machine)
    #[arg(long)]
    workers: Option<usize>,

    /// Pages to prerender ahead and behind the current one
    #[arg(long)]
    lookahead: Option<usize>,

    /// Log file path
    #[arg(long, default_value = "pokazka.log")]
    log_file: PathBuf,
}

/// Stand-in for a windowing surface: reports presented pages on stdout
struct ConsoleSurface {
    name: &'static str,
}

impl Surface for ConsoleSurface {
    fn present(&mut self, page: usize, bitmap: &Arc<Bitmap>) {
        println!(
            "[{}] page {} ({}x{})",
            self.name,
            page + 1,
            bitmap.width,
            bitmap.height
        );
    }

    fn placeholder(&mut self, page: usize) {
        println!("[{}] page {} rendering...", self.name, page + 1);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&args.log_file)?,
    )?;

    info!("Starting pokazka presentation viewer");

    let mut settings = settings::load_settings();
    if let Some(workers) = args.workers {
        settings.workers = Some(workers);
    }
    if let Some(lookahead) = args.lookahead {
        settings.lookahead = lookahead;
    }

    let doc = open_document(&args.file)?;
    let page_count = doc.page_count();

    let cache = Arc::new(BitmapCache::new(settings.cache_max_bytes()));
    let scheduler = PrerenderScheduler::new(
        settings.effective_workers(),
        Arc::clone(&doc),
        Arc::clone(&cache),
    );
    let mut overlays = OverlayManager::new(Arc::clone(&doc), Box::new(NullBackend));
    overlays.set_autoplay(settings.autoplay);

    let mut presenter = Presenter::new(Arc::clone(&cache));
    presenter.attach(Purpose::Content, Box::new(ConsoleSurface { name: "content" }));

    let mut nav = NavController::new(
        doc,
        Arc::clone(&cache),
        scheduler,
        overlays,
        settings.lookahead,
        settings.quantize_px,
    );
    nav.resize(Purpose::Content, 1280, 720);

    let mut timer = TalkTimer::new();
    let quantize_px = settings.quantize_px;

    println!("opened {:?}: {page_count} pages", args.file);
    println!("commands: n(ext) p(rev) g <page> j <label> b(lank) t(imer) q(uit)");

    let stdin = stdin();
    loop {
        presenter.pump();
        nav.overlays().handle_events();
        presenter.show(RenderKey::quantized(
            nav.current_page(),
            Purpose::Content,
            1280,
            720,
            quantize_px,
        ));

        print!("{} [{}]> ", format_clock(timer.elapsed()), nav.current_page() + 1);
        stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("n") => nav.next(),
            Some("p") => nav.prev(),
            Some("g") => {
                if let Some(page) = parts.next().and_then(|s| s.parse::<usize>().ok()) {
                    nav.goto(page.saturating_sub(1));
                }
            }
            Some("j") => {
                if let Some(label) = parts.next() {
                    nav.jump(label);
                }
            }
            Some("b") => {
                let blanked = !nav.state().blanked;
                nav.set_blanked(blanked);
                println!("screen {}", if blanked { "blanked" } else { "restored" });
            }
            Some("t") => {
                timer.toggle();
                println!(
                    "timer {} at {}",
                    if timer.is_running() { "running" } else { "paused" },
                    format_clock(timer.elapsed())
                );
            }
            Some("q") => break,
            Some(other) => println!("unknown command {other:?}"),
            None => {}
        }
    }

    info!("Shutting down");
    Ok(())
}

#[cfg(feature = "pdf")]
fn open_document(path: &std::path::Path) -> Result<pokazka::SharedDocument> {
    use pokazka::doc::mupdf_backend::MupdfDocument;
    let doc = MupdfDocument::open(path)?;
    Ok(Arc::new(doc))
}

#[cfg(not(feature = "pdf"))]
fn open_document(_path: &std::path::Path) -> Result<pokazka::SharedDocument> {
    anyhow::bail!("built without the `pdf` feature, no document backend available")
}
