use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use croplens::annotations::geojson;
use croplens::api::types::ExportScope;
use croplens::api::{AnnotationStore, ApiClient, AuthSession};
use croplens::config::CropLensConfig;
use croplens::domain::{
    AnalysisKind, GroundSampleDistance, ImageInfo, ImagePoint, ImageSize, ViewMode,
};
use croplens::imagery::{ImageCache, PAGE_SIZE, next_page_skip};
use croplens::render::render_scene;
use croplens::roi::{PollSettings, RoiEvent, run_roi_analysis};
use croplens::session::messages::{RoiMsg, StoreMsg};
use croplens::session::{Command, EditorSession, Msg};

#[derive(Parser)]
#[command(name = "croplens", about = "Annotate and analyze aerial crop imagery")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured API base URL
    #[arg(long, global = true)]
    api: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an access token for later commands
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the stored access token
    Logout,
    /// List images, optionally within one project
    Images {
        #[arg(long)]
        project: Option<i64>,
    },
    /// Render an image with its annotations and overlays to a PNG
    Render(RenderArgs),
    /// Export annotations as GeoJSON
    Export(ExportArgs),
    /// Run the ROI analysis workflow on an image
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct RenderArgs {
    image: i64,
    /// Project to look the image up in
    #[arg(long)]
    project: Option<i64>,
    #[arg(short, long)]
    output: PathBuf,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 960)]
    height: u32,
    /// Layer preset: original, vegetation, health, detection, water, heatmap, full
    #[arg(long)]
    view_mode: Option<ViewMode>,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long, conflicts_with = "project", required_unless_present = "project")]
    image: Option<i64>,
    #[arg(long)]
    project: Option<i64>,
    /// Build the collection from the loaded annotations instead of the server export
    #[arg(long, requires = "image")]
    local: bool,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct AnalyzeArgs {
    image: i64,
    #[arg(long)]
    project: Option<i64>,
    /// Polygon vertices in image pixels, "x,y;x,y;x,y". Defaults to the stored ROI.
    #[arg(long)]
    polygon: Option<String>,
    /// Comma separated analyses; defaults to the configured set
    #[arg(long, value_delimiter = ',')]
    analyses: Vec<AnalysisKind>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = CropLensConfig::load();
    if let Some(api) = cli.api {
        config.api_base_url = api;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Login { token } => {
            let mut session = load_session()?;
            session.set_token(token)?;
            println!("Logged in");
            Ok(())
        }
        Commands::Logout => {
            load_session()?.logout()?;
            println!("Logged out");
            Ok(())
        }
        Commands::Images { project } => runtime.block_on(list_images(&config, project)),
        Commands::Render(args) => runtime.block_on(render(config, args)),
        Commands::Export(args) => runtime.block_on(export(&config, args)),
        Commands::Analyze(args) => runtime.block_on(analyze(config, args)),
    }
}

fn load_session() -> Result<AuthSession> {
    let path = CropLensConfig::session_path()
        .ok_or_else(|| anyhow!("No configuration directory for the session file"))?;
    AuthSession::load_from_storage(&path)
}

fn client(config: &CropLensConfig) -> Result<ApiClient> {
    let session = load_session()?;
    if !session.is_authenticated() {
        bail!("Not logged in; run `croplens login --token <TOKEN>` first");
    }
    Ok(ApiClient::new(config, session)?)
}

// ============================================================================
// Images
// ============================================================================

async fn fetch_images(client: &ApiClient, project: Option<i64>) -> Result<Vec<ImageInfo>> {
    let mut images = Vec::new();
    let mut skip = 0;
    loop {
        let page = client
            .list_images(project, skip, PAGE_SIZE)
            .await
            .context("Failed to list images")?;
        let next = next_page_skip(&page, skip);
        images.extend(page.images);
        match next {
            Some(n) => skip = n,
            None => break,
        }
    }
    Ok(images)
}

async fn find_image(client: &ApiClient, project: Option<i64>, image_id: i64) -> Result<ImageInfo> {
    fetch_images(client, project)
        .await?
        .into_iter()
        .find(|i| i.id == image_id)
        .ok_or_else(|| anyhow!("Image {} not found", image_id))
}

async fn list_images(config: &CropLensConfig, project: Option<i64>) -> Result<()> {
    let client = client(config)?;
    for image in fetch_images(&client, project).await? {
        let size = image
            .size()
            .map(|s| format!("{}x{}", s.width, s.height))
            .unwrap_or_else(|| "?".to_string());
        let gps = image
            .gps_center()
            .map(|(lat, lon)| format!("{lat:.6}, {lon:.6}"))
            .unwrap_or_else(|| "no GPS".to_string());
        println!(
            "{:>6}  {:>11}  {:<24}  {}",
            image.id,
            size,
            gps,
            image.status.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// ============================================================================
// Session driver
// ============================================================================

/// Loads an image into an editor session and runs the commands it emits
struct Driver {
    client: ApiClient,
    session: EditorSession,
    cache: ImageCache,
}

impl Driver {
    fn new(config: CropLensConfig, viewport: ImageSize) -> Result<Self> {
        let client = client(&config)?;
        Ok(Self {
            client,
            session: EditorSession::new(config, viewport),
            cache: ImageCache::new(),
        })
    }

    async fn open(&mut self, image: ImageInfo, project: Option<i64>) -> Result<()> {
        let metadata = self
            .cache
            .load(&self.client, image.id, self.session.config.fallback_gsd_m)
            .await
            .with_context(|| format!("Failed to load image {}", image.id))?;
        let commands = self.session.update(Msg::ImageOpened {
            image,
            project_id: project,
            metadata,
        });
        self.run(commands).await
    }

    async fn dispatch(&mut self, msg: Msg) -> Result<()> {
        let commands = self.session.update(msg);
        self.run(commands).await
    }

    async fn run(&mut self, commands: Vec<Command>) -> Result<()> {
        let mut queue = VecDeque::from(commands);
        while let Some(command) = queue.pop_front() {
            let follow_up = match command {
                Command::LoadAnnotations(image_id) => {
                    let result = self.client.list(image_id).await;
                    self.session
                        .update(Msg::Store(StoreMsg::Listed { image_id, result }))
                }
                Command::PersistAnnotation(pending) => {
                    let result = self.client.create(&pending.body).await;
                    self.session.update(Msg::Store(StoreMsg::Created {
                        local_key: pending.local_key,
                        result,
                    }))
                }
                Command::DeleteAnnotation(id) => {
                    let result = self.client.delete(id).await;
                    self.session
                        .update(Msg::Store(StoreMsg::Deleted { id, result }))
                }
                Command::RunRoi {
                    job,
                    cancel,
                    generation,
                } => {
                    let poll = PollSettings::from(&self.session.config);
                    let mut events = Vec::new();
                    let result = run_roi_analysis(&self.client, &job, poll, &cancel, |event| {
                        print_event(&event);
                        events.push(event);
                    })
                    .await;
                    for event in events {
                        self.session
                            .update(Msg::Roi(RoiMsg::Progress { generation, event }));
                    }
                    self.session
                        .update(Msg::Roi(RoiMsg::Finished { generation, result }))
                }
            };
            queue.extend(follow_up);
        }
        Ok(())
    }
}

// ============================================================================
// Subcommands
// ============================================================================

async fn render(config: CropLensConfig, args: RenderArgs) -> Result<()> {
    let viewport = ImageSize::new(args.width, args.height);
    let mut driver = Driver::new(config, viewport)?;
    let image = find_image(&driver.client, args.project, args.image).await?;
    driver.open(image, args.project).await?;
    let mode = args
        .view_mode
        .unwrap_or(driver.session.config.default_view_mode);
    driver.dispatch(Msg::view_mode(mode)).await?;

    let session = &driver.session;
    let scene = session.scene(driver.cache.pixels());
    let output = render_scene(&scene, &session.view, viewport)
        .ok_or_else(|| anyhow!("Cannot render a {}x{} viewport", args.width, args.height))?;
    output
        .image
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    for label in &output.labels {
        println!("{:>8.1} {:>8.1}  {}", label.at.x, label.at.y, label.text);
    }
    log::info!("Rendered image {} to {}", args.image, args.output.display());
    Ok(())
}

async fn export(config: &CropLensConfig, args: ExportArgs) -> Result<()> {
    let client = client(config)?;
    let collection = match (args.image, args.project, args.local) {
        (Some(image_id), project, true) => {
            let image = find_image(&client, project, image_id).await?;
            let gsd = client
                .gsd(image_id)
                .await
                .map(|r| r.resolve(config.fallback_gsd_m))
                .unwrap_or_else(|err| {
                    log::warn!("GSD unavailable for image {}: {}", image_id, err);
                    GroundSampleDistance::estimated(config.fallback_gsd_m)
                });
            let records = client
                .list(image_id)
                .await
                .context("Failed to list annotations")?;
            let annotations: Vec<_> = records
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.to_annotation(i as u64))
                .collect();
            geojson::export_local(&annotations, &image, &gsd)
        }
        (Some(image_id), _, false) => client
            .export_geojson(ExportScope::Image(image_id))
            .await
            .context("GeoJSON export failed")?,
        (None, Some(project_id), _) => client
            .export_geojson(ExportScope::Project(project_id))
            .await
            .context("GeoJSON export failed")?,
        (None, None, _) => bail!("Either --image or --project is required"),
    };

    let json = serde_json::to_string_pretty(&collection)?;
    match args.output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

async fn analyze(config: CropLensConfig, args: AnalyzeArgs) -> Result<()> {
    let polygon = args.polygon.as_deref().map(parse_polygon).transpose()?;
    let mut driver = Driver::new(config, ImageSize::new(1280, 960))?;
    let image = find_image(&driver.client, args.project, args.image).await?;
    driver.open(image, args.project).await?;

    if let Some(vertices) = polygon
        && !driver.session.roi.close(vertices)
    {
        bail!("The polygon needs at least 3 vertices enclosing an area");
    }
    driver.dispatch(Msg::run_roi(args.analyses)).await?;

    let roi = &driver.session.roi;
    println!("{}", roi.phase().status_text());
    let Some(report) = roi.report() else {
        bail!("ROI analysis did not complete");
    };
    if let Some(result) = &report.roi_result {
        for (category, value) in &result.categories {
            println!("{category}: {value}");
        }
    }
    if let Some(summary) = &report.summary {
        println!(
            "Project: {}/{} images analyzed, status {}",
            summary.analyzed_images, summary.total_images, summary.status
        );
    }
    println!("{}", report.summary_line());
    Ok(())
}

fn print_event(event: &RoiEvent) {
    match event {
        RoiEvent::StepStarted { step, total, label } => println!("[{step}/{total}] {label}"),
        RoiEvent::StepFinished { step, succeeded } if !succeeded => {
            println!("[{step}] failed")
        }
        RoiEvent::PollAttempt {
            attempt,
            max_attempts,
        } => log::debug!("Poll {}/{}", attempt, max_attempts),
        _ => {}
    }
}

/// "x,y;x,y;..." in image pixels
fn parse_polygon(text: &str) -> Result<Vec<ImagePoint>> {
    text.split(';')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| anyhow!("Expected x,y but got '{}'", pair))?;
            let x: f64 = x.trim().parse().with_context(|| format!("Bad x in '{pair}'"))?;
            let y: f64 = y.trim().parse().with_context(|| format!("Bad y in '{pair}'"))?;
            Ok(ImagePoint::new(x, y))
        })
        .collect()
}
