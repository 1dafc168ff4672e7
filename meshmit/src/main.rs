use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use log::info;
use martini::{decode, decode_tile, Encoding, Grid, Martini, Mesh, Raster};
use std::{
    fs::File,
    io::{BufWriter, Write},
};

/// A terrain-RGB tile multitool.
#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: SubCmd,
}

#[derive(Clone, Debug, Subcommand)]
enum SubCmd {
    /// Decode a terrain-RGB image to raw little-endian f32 elevations.
    Decode(GridArgs),
    /// Write a terrain-RGB image's RTIN error grid as raw little-endian f32.
    Errors(GridArgs),
    /// Extract an RTIN mesh from a terrain-RGB image.
    Mesh(MeshArgs),
    /// Render a terrain-RGB image's decoded elevation as grayscale.
    Render(RenderArgs),
}

#[derive(Args, Clone, Debug)]
struct SrcArgs {
    /// Source terrain-RGB image.
    src: Utf8PathBuf,

    /// Elevation encoding, "mapbox" or "terrarium".
    #[arg(short, long, default_value = "mapbox", value_parser = parse_encoding)]
    encoding: Encoding,

    /// Decode the image as-is instead of backfilling it to a
    /// `2^n + 1` grid.
    #[arg(long)]
    no_backfill: bool,
}

#[derive(Args, Clone, Debug)]
struct GridArgs {
    #[command(flatten)]
    src: SrcArgs,

    /// Optional output file name.
    ///
    /// If not specified, the source path with a `.terrain` or
    /// `.errors` extension is used.
    dest: Option<Utf8PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct MeshArgs {
    #[command(flatten)]
    src: SrcArgs,

    /// Maximum error, in meters, of omitted samples.
    #[arg(short, long, default_value_t = 5.0)]
    max_error: f32,

    /// Optional JSON output file for the mesh.
    #[arg(long)]
    json: Option<Utf8PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct RenderArgs {
    #[command(flatten)]
    src: SrcArgs,

    /// Optional output file name.
    ///
    /// Image format will be based on `dest`'s extension.
    ///
    /// If not specified, a png will be written with the source's
    /// basename and a `-elevation` suffix in the source's dir.
    dest: Option<Utf8PathBuf>,
}

fn parse_encoding(s: &str) -> Result<Encoding, String> {
    s.parse().map_err(|e: martini::MartiniError| e.to_string())
}

fn load(SrcArgs {
    src,
    encoding,
    no_backfill,
}: &SrcArgs) -> Result<Grid> {
    let img = image::open(src).with_context(|| format!("opening {src}"))?;
    let raster = Raster::from_image(&img);
    let (width, height) = raster.dimensions();
    let terrain = if *no_backfill {
        decode(&raster, *encoding)?
    } else {
        decode_tile(&raster, *encoding)?
    };
    info!(
        "decoded {width}x{height} {src} as {encoding}; size: {}, min: {}, max: {}",
        terrain.size(),
        terrain.min(),
        terrain.max()
    );
    Ok(terrain)
}

fn dest_or(src: &Utf8Path, dest: Option<Utf8PathBuf>, extension: &str) -> Utf8PathBuf {
    dest.unwrap_or_else(|| src.with_extension(extension))
}

fn create(out: &Utf8Path) -> Result<File> {
    info!("writing to {out}");
    File::create(out).with_context(|| format!("creating {out}"))
}

/// Flushes before returning; write errors must not be left to `drop`.
fn write_grid_to(grid: &Grid, dst: impl Write) -> Result<()> {
    let mut dst = BufWriter::new(dst);
    grid.write_le(&mut dst)?;
    dst.flush()?;
    Ok(())
}

fn write_mesh_to(mesh: &Mesh, dst: impl Write) -> Result<()> {
    let mut dst = BufWriter::new(dst);
    serde_json::to_writer(&mut dst, mesh)?;
    dst.flush()?;
    Ok(())
}

fn write_grid(grid: &Grid, out: &Utf8Path) -> Result<()> {
    write_grid_to(grid, create(out)?).with_context(|| format!("writing {out}"))
}

fn decode_cmd(GridArgs { src, dest }: GridArgs) -> Result<()> {
    let terrain = load(&src)?;
    write_grid(&terrain, &dest_or(&src.src, dest, "terrain"))
}

fn errors_cmd(GridArgs { src, dest }: GridArgs) -> Result<()> {
    let terrain = load(&src)?;
    let martini = Martini::new(terrain.size())?;
    let tile = martini.create_tile(&terrain)?;
    write_grid(tile.errors(), &dest_or(&src.src, dest, "errors"))
}

fn mesh_cmd(
    MeshArgs {
        src,
        max_error,
        json,
    }: MeshArgs,
) -> Result<()> {
    let terrain = load(&src)?;
    let martini = Martini::new(terrain.size())?;
    let tile = martini.create_tile(&terrain)?;
    let mesh = tile.mesh(max_error)?;
    info!(
        "max_error: {max_error}, vertices: {}, triangles: {}",
        mesh.vertices.len(),
        mesh.triangles.len()
    );
    if let Some(out) = json {
        write_mesh_to(&mesh, create(&out)?).with_context(|| format!("writing {out}"))?;
    }
    Ok(())
}

fn render_cmd(RenderArgs { src, dest }: RenderArgs) -> Result<()> {
    let terrain = load(&src)?;
    let out = dest.map_or_else(
        || {
            let stem = src.src.file_stem().unwrap_or("tile");
            src.src.with_file_name(format!("{stem}-elevation.png"))
        },
        |mut out| {
            if out.is_dir() {
                let stem = src.src.file_stem().unwrap_or("tile");
                out.push(format!("{stem}-elevation.png"));
            }
            out
        },
    );

    info!("writing to {out}");
    if let Some("png" | "tif" | "tiff") = out.extension() {
        terrain.to_image::<u16>().save(&out)?;
    } else {
        terrain.to_image::<u8>().save(&out)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        SubCmd::Decode(args) => decode_cmd(args),
        SubCmd::Errors(args) => errors_cmd(args),
        SubCmd::Mesh(args) => mesh_cmd(args),
        SubCmd::Render(args) => render_cmd(args),
    }
}
