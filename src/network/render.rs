/*!
Graph rendering.

The DOT source is always written to the output stem. For image formats Graphviz lays the
graph out as SVG; PNG output is rasterized from that SVG with resvg.
*/

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use thiserror::Error;
use tiny_skia::{Color, Pixmap, Transform};
use tracing::{debug, info};

use crate::network::network_graph::NetworkGraph;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
    /// DOT source only; Graphviz is not invoked.
    Dot,
}

impl OutputFormat {
    fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Png => Some("png"),
            OutputFormat::Svg => Some("svg"),
            OutputFormat::Dot => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Path of the DOT source; image files get the format appended (`network_graph.png`).
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Open the artifact with the system viewer once written.
    pub view: bool,
    /// Graphviz layout program.
    pub layout_engine: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("network_graph"),
            format: OutputFormat::Png,
            view: true,
            layout_engine: "dot".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to run Graphviz `{engine}`: {source}")]
    Layout {
        engine: String,
        source: std::io::Error,
    },
    #[error("Graphviz `{engine}` exited with {status}: {stderr}")]
    LayoutFailed {
        engine: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to parse SVG: {0}")]
    Svg(#[from] usvg::Error),
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("failed to encode PNG: {0}")]
    Png(String),
    #[error("failed to open {}: {source}", path.display())]
    View {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn with_suffix(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    std::fs::write(path, contents).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn layout_svg(engine: &str, dot_path: &Path) -> Result<Vec<u8>, RenderError> {
    debug!(engine, source = %dot_path.display(), "running Graphviz layout");
    let output = Command::new(engine)
        .arg("-Tsvg")
        .arg(dot_path)
        .output()
        .map_err(|source| RenderError::Layout {
            engine: engine.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(RenderError::LayoutFailed {
            engine: engine.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Rasterize SVG bytes to PNG at their natural size on a white background.
pub fn rasterize_svg(svg: &[u8]) -> Result<Vec<u8>, RenderError> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_data(svg, &options)?;

    let size = tree.size().to_int_size();
    let (width, height) = (size.width(), size.height());
    let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;
    pixmap.fill(Color::WHITE);
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    pixmap.encode_png().map_err(|e| RenderError::Png(e.to_string()))
}

/// Write the graph in the requested format and optionally open it. Returns the artifact path.
pub fn render(graph: &NetworkGraph, options: &RenderOptions) -> Result<PathBuf, RenderError> {
    write_file(&options.output, graph.to_dot().as_bytes())?;

    let artifact = match options.format.extension() {
        None => options.output.clone(),
        Some(extension) => {
            let svg = layout_svg(&options.layout_engine, &options.output)?;
            let image = match options.format {
                OutputFormat::Png => rasterize_svg(&svg)?,
                _ => svg,
            };
            let path = with_suffix(&options.output, extension);
            write_file(&path, &image)?;
            path
        }
    };
    info!(
        path = %artifact.display(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "network graph written"
    );

    if options.view {
        open::that(&artifact).map_err(|source| RenderError::View {
            path: artifact.clone(),
            source,
        })?;
    }
    Ok(artifact)
}
