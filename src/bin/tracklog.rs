use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gpx_tracklog::geo::great_circle_distance;
use gpx_tracklog::options::{ExportOptions, MissingTimePolicy, ParseOptions};
use gpx_tracklog::{GpxDocument, SignificanceFilter, TrackLog, TrackerConfig, converter, parser, writer};

#[derive(Parser)]
#[command(name = "tracklog", about = "Inspect and convert GPX track logs")]
struct Cli {
    /// JSON file with tracker settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Drop points without <time> instead of rejecting the file
    #[arg(long, global = true)]
    skip_untimed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print track, segment, point and waypoint counts")]
    Summary { input: PathBuf },

    #[command(about = "Parse and write back a GPX file")]
    Normalize {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(about = "Replay track points through the significance filter")]
    Thin {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(about = "Convert a GPX file to GeoJSON")]
    Geojson {
        input: PathBuf,
        /// One MultiLineString per track
        #[arg(long)]
        join: bool,
        #[arg(long)]
        no_elevation: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::default(),
    };
    let parse_opts = ParseOptions {
        missing_time: if cli.skip_untimed {
            MissingTimePolicy::SkipPoint
        } else {
            MissingTimePolicy::RejectFile
        },
    };

    match cli.command {
        Commands::Summary { input } => {
            let doc = parser::parse_file(&input, &parse_opts)?;
            print_summary(&doc);
        }
        Commands::Normalize { input, output } => {
            let doc = parser::parse_file(&input, &parse_opts)?;
            emit(&doc, output.as_deref())?;
        }
        Commands::Thin { input, output } => {
            let doc = parser::parse_file(&input, &parse_opts)?;
            let thinned = thin(&doc, &config)?;
            tracing::info!(points = thinned.point_count(), "thinned");
            emit(&thinned, output.as_deref())?;
        }
        Commands::Geojson {
            input,
            join,
            no_elevation,
        } => {
            let doc = parser::parse_file(&input, &parse_opts)?;
            let opts = ExportOptions {
                join_track_segments: join,
                include_elevation: !no_elevation,
                ..Default::default()
            };
            let fc = converter::to_feature_collection(&doc, &opts);
            println!("{}", serde_json::to_string_pretty(&fc)?);
        }
    }
    Ok(())
}

fn print_summary(doc: &GpxDocument) {
    let segments: usize = doc.tracks().iter().map(|t| t.segments().len()).sum();
    let distance: f64 = doc
        .tracks()
        .iter()
        .flat_map(|t| t.segments())
        .flat_map(|s| s.points().windows(2))
        .map(|w| great_circle_distance(w[0].location, w[1].location))
        .sum();

    println!("tracks:    {}", doc.tracks().len());
    println!("segments:  {segments}");
    println!("points:    {}", doc.point_count());
    println!("waypoints: {}", doc.waypoints().len());
    println!("distance:  {:.1} km", distance / 1000.0);
}

/// Records every segment again as if its points arrived live.
///
/// All segments end up in a single unnamed track.
fn thin(doc: &GpxDocument, config: &TrackerConfig) -> gpx_tracklog::Result<GpxDocument> {
    let mut log = TrackLog::default();
    for track in doc.tracks() {
        for segment in track.segments() {
            let mut filter = SignificanceFilter::from_config(config);
            log.start_new_segment();
            for point in segment.points() {
                let major = filter.classify(point);
                log.handle_fix(point.clone(), major);
            }
            log.end_segment(filter.current_location().cloned());
        }
    }
    for waypoint in doc.waypoints() {
        log.store_waypoint(waypoint.point().clone())?;
    }
    Ok(log.document().clone())
}

fn emit(doc: &GpxDocument, output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match output {
        Some(path) => writer::write_file(path, doc)?,
        None => print!("{}", writer::to_xml(doc)?),
    }
    Ok(())
}
