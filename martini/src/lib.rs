//! Terrain-RGB elevation decoding and RTIN terrain meshing.
//!
//! ```no_run
//! use martini::{decode_tile, Encoding, Martini, Raster};
//!
//! # fn main() -> Result<(), martini::MartiniError> {
//! # let pixels = vec![0u8; 256 * 256 * 4];
//! let raster = Raster::new(pixels, 256, 256, 4)?;
//! let terrain = decode_tile(&raster, Encoding::Mapbox)?;
//! let martini = Martini::new(terrain.size())?;
//! let tile = martini.create_tile(&terrain)?;
//! let mesh = tile.mesh(5.0)?;
//! println!("{} triangles", mesh.triangles.len());
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! 1. [mapbox/martini](https://github.com/mapbox/martini)

mod cell;
mod decode;
mod error;
mod grid;
mod mesh;
mod rtin;

pub use crate::{
    cell::Cell,
    decode::{decode, decode_tile, Encoding, Raster},
    error::MartiniError,
    grid::{Get, Grid},
    mesh::Mesh,
    rtin::{create_tile, Martini, Tile},
};
