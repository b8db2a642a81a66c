//! CLI for extracting facial sub-meshes from a source and a target scan.
//!
//! Usage:
//!   face-submesh --source-img a.png --source-obj a.obj --source-landmarks a.txt \
//!                --target-img b.png --target-obj b.obj --target-landmarks b.txt
//!   face-submesh ... --boundary outer --boundary inner --with-chunks
//!   face-submesh ... --json                 # JSON summary

use std::path::PathBuf;
use std::thread;

use clap::builder::PossibleValuesParser;
use clap::Parser;
use face_submesh::{
    check_distinct_outputs, default_keypoints, load_anchors, run_extraction, Anchor, BoundarySet,
    ContourTable, ExtractionJob, ExtractionSummary, LandmarkFile, PipelineConfig, BOUNDARY_NAMES,
};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "face-submesh")]
#[command(author, version, about = "Landmark-bounded facial sub-mesh extraction", long_about = None)]
struct Args {
    /// Source photograph
    #[arg(long)]
    source_img: PathBuf,

    /// Source mesh (OBJ)
    #[arg(long)]
    source_obj: PathBuf,

    /// Detector output for the source photograph
    #[arg(long)]
    source_landmarks: PathBuf,

    /// Rendered keypoint markers for the source photograph
    #[arg(long)]
    source_markers: Option<PathBuf>,

    /// Target photograph
    #[arg(long)]
    target_img: PathBuf,

    /// Target mesh (OBJ)
    #[arg(long)]
    target_obj: PathBuf,

    /// Detector output for the target photograph
    #[arg(long)]
    target_landmarks: PathBuf,

    /// Rendered keypoint markers for the target photograph
    #[arg(long)]
    target_markers: Option<PathBuf>,

    /// Contour to extract (repeatable)
    #[arg(long, default_value = "outer", value_parser = PossibleValuesParser::new(BOUNDARY_NAMES))]
    boundary: Vec<String>,

    /// Subtract the boundary's chunk regions
    #[arg(long)]
    with_chunks: bool,

    /// Contour table root (overrides config)
    #[arg(long)]
    contours: Option<PathBuf>,

    /// Output root directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output summary as JSON
    #[arg(short, long)]
    json: bool,

    /// Show debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Output structure for JSON serialization
#[derive(Serialize)]
struct Output {
    source: Vec<ExtractionSummary>,
    target: Vec<ExtractionSummary>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("face_submesh=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("face_submesh=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(contours) = &args.contours {
        config.contours = contours.clone();
    }
    config.validate()?;
    debug!(?config, "configuration");

    let table = ContourTable::new(&config.contours);
    let boundaries = args
        .boundary
        .iter()
        .map(|name| table.boundary_set(name, args.with_chunks))
        .collect::<face_submesh::Result<Vec<BoundarySet>>>()?;

    let keypoints: Vec<Anchor> = match &config.keypoints {
        Some(path) => load_anchors(path)?,
        None => default_keypoints(),
    };
    let metric_points: Vec<Anchor> = match &config.metric_points {
        Some(path) => load_anchors(path)?,
        None => Vec::new(),
    };

    let source_markers = load_markers(args.source_markers.as_ref())?;
    let target_markers = load_markers(args.target_markers.as_ref())?;

    let source_job = ExtractionJob {
        image: args.source_img.clone(),
        mesh: args.source_obj.clone(),
        boundaries: &boundaries,
        keypoints: &keypoints,
        metric_points: &metric_points,
        markers: source_markers.as_ref(),
        output: args.output.clone(),
    };
    let target_job = ExtractionJob {
        image: args.target_img.clone(),
        mesh: args.target_obj.clone(),
        markers: target_markers.as_ref(),
        ..source_job.clone()
    };
    check_distinct_outputs(&[&source_job, &target_job])?;
    let source_provider = LandmarkFile::new(&args.source_landmarks);
    let target_provider = LandmarkFile::new(&args.target_landmarks);

    info!(boundaries = ?args.boundary, output = %args.output.display(), "extracting source and target");
    let (source, target) = thread::scope(|s| {
        let source = s.spawn(|| run_extraction(&source_job, &source_provider, &config));
        let target = s.spawn(|| run_extraction(&target_job, &target_provider, &config));
        (source.join(), target.join())
    });
    let output = Output {
        source: source.map_err(|_| "source extraction panicked")??,
        target: target.map_err(|_| "target extraction panicked")??,
    };

    let output_str = if args.json {
        serde_json::to_string_pretty(&output)?
    } else {
        format_human_readable(&output)
    };
    println!("{}", output_str);

    Ok(())
}

fn load_markers(path: Option<&PathBuf>) -> Result<Option<RgbImage>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Some(image::open(path)?.to_rgb8())),
        None => Ok(None),
    }
}

fn format_human_readable(output: &Output) -> String {
    let mut s = String::new();

    for (role, summaries) in [("Source", &output.source), ("Target", &output.target)] {
        for summary in summaries {
            let m = &summary.metrics;
            s.push_str(&format!("\n--- {} / {} ---\n", role, summary.boundary));
            s.push_str(&format!("Input: {}\n", summary.input));
            if let Some(outputs) = &summary.outputs {
                s.push_str(&format!("Mesh:  {}\n", outputs.mesh.display()));
            }

            s.push_str("\nRegion:\n");
            s.push_str(&format!("  Boundary area: {:.1} px\n", m.boundary_area));
            s.push_str(&format!("  Mask:          {} px ({:.1}% of image, {:.1}% fill)\n",
                m.mask_pixels, m.mask_of_image_ratio(), m.fill_ratio()));

            s.push_str("\nMesh:\n");
            s.push_str(&format!("  Texture coords: {} of {} ({:.1}%)\n",
                m.texcoords_retained, m.texcoords_total, m.retained_ratio()));
            s.push_str(&format!("  Faces:          {} of {} ({:.1}%, {} dropped)\n",
                m.faces_kept, m.faces_total, m.face_retention_ratio(), m.faces_dropped()));
            if m.malformed_lines > 0 {
                s.push_str(&format!("  Malformed lines skipped: {}\n", m.malformed_lines));
            }

            if !summary.keypoints.is_empty() {
                s.push_str("\nKeypoints:\n");
                for kp in &summary.keypoints {
                    s.push_str(&format!("  {:<12} vt {:>6} ({:.5}, {:.5}, {:.5})\n",
                        kp.name, kp.texture_index, kp.position.x, kp.position.y, kp.position.z));
                }
            }
        }
    }

    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_boundary_ships_with_the_crate() {
        let args = Args::try_parse_from([
            "face-submesh",
            "--source-img", "a.png",
            "--source-obj", "a.obj",
            "--source-landmarks", "a.txt",
            "--target-img", "b.png",
            "--target-obj", "b.obj",
            "--target-landmarks", "b.txt",
        ])
        .unwrap();
        assert_eq!(args.boundary, vec!["outer".to_string()]);

        let table = ContourTable::new(concat!(env!("CARGO_MANIFEST_DIR"), "/contours"));
        for name in &args.boundary {
            table.boundary_set(name, false).unwrap();
        }
    }
}
