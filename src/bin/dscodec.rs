
//! Convert between png or ppm files and dsc containers.
//! Set `RUST_LOG=debug` to see the derived configuration and per slice diagnostics.

use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::{ImageBuffer, Rgb};
use dsc::prelude::*;


#[derive(Parser, Debug)]
#[command(about = "Encode and decode display stream compression containers", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {

    /// Compress an rgb picture into a container.
    Encode {
        /// The png or ppm picture to compress.
        input: PathBuf,

        /// The container to create.
        output: PathBuf,

        /// Target bits per pixel, in steps of 1/16.
        #[arg(long, default_value_t = 8.0)]
        bits_per_pixel: f32,

        /// Bits per component of the coded samples: 8, 10, or 12.
        #[arg(long, default_value_t = 8)]
        bits_per_component: u8,

        /// Slice width in pixels, defaults to the picture width.
        #[arg(long)]
        slice_width: Option<usize>,

        /// Slice height in lines, defaults to the picture height.
        #[arg(long)]
        slice_height: Option<usize>,

        /// Use a variable bit rate, storing the size of each chunk.
        #[arg(long)]
        vbr: bool,

        /// Disable the block prediction search.
        #[arg(long)]
        no_block_prediction: bool,

        /// Also write the picture that a decoder will reconstruct.
        #[arg(long)]
        reconstructed: Option<PathBuf>,
    },

    /// Decode a container into a png or ppm picture.
    Decode {
        /// The container to decode.
        input: PathBuf,

        /// The picture to create.
        output: PathBuf,
    },

    /// Print the configuration stored in a container.
    Info {
        /// The container to inspect.
        input: PathBuf,
    },
}


fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Encode {
            input, output, bits_per_pixel, bits_per_component,
            slice_width, slice_height, vbr, no_block_prediction, reconstructed
        } => {
            let picture = load_picture(&input, bits_per_component)?;

            let slice_size = match (slice_width, slice_height) {
                (None, None) => None,
                (width, height) => Some(Vec2(
                    width.unwrap_or(picture.size.width()),
                    height.unwrap_or(picture.size.height()),
                )),
            };

            let parameters = Parameters {
                bits_per_pixel, bits_per_component, vbr, slice_size,
                block_prediction: !no_block_prediction,
                .. Parameters::default()
            };

            let encoded = write_to_file(&output, &parameters, &picture)
                .with_context(|| format!("could not compress {}", input.display()))?;

            let statistics = encoded.statistics;
            log::info!(
                "{} groups, {} using history, {} flat, {} midpoint units, max qp {}, peak buffer {} bits",
                statistics.groups, statistics.history_groups, statistics.flat_groups,
                statistics.midpoint_units, statistics.max_qp, statistics.max_buffer_fullness
            );

            if let Some(difference) = picture.max_difference(&encoded.reconstructed) {
                log::info!("maximum sample error {}", difference);
            }

            if let Some(path) = reconstructed {
                save_picture(&path, &encoded.reconstructed)?;
            }
        },

        Command::Decode { input, output } => {
            let picture = read_from_file(&input)
                .with_context(|| format!("could not decode {}", input.display()))?;

            save_picture(&output, &picture)?;
        },

        Command::Info { input } => {
            let mut file = std::io::BufReader::new(std::fs::File::open(&input)?);
            let compressed = Compressed::read(&mut file)?;
            println!("{:#?}", compressed.config);

            let bytes: usize = compressed.slices.iter().map(|slice| slice.bytes.len()).sum();
            println!("{} slices, {} bytes of slice data", compressed.slices.len(), bytes);
        },
    }

    Ok(())
}

/// Load an rgb picture, rescaling 16 bit samples to the bits per component.
fn load_picture(path: &Path, bits_per_component: u8) -> Result<Picture> {
    if ![8, 10, 12].contains(&bits_per_component) {
        bail!("bits per component must be 8, 10, or 12");
    }

    let pixels = image::open(path)
        .with_context(|| format!("could not open {}", path.display()))?
        .to_rgb16();

    let size = Vec2(pixels.width() as usize, pixels.height() as usize);
    let shift = 16 - bits_per_component;

    Ok(Picture::from_fn(size, ColorFormat::Rgb, bits_per_component, |channel, Vec2(x, y)| {
        pixels.get_pixel(x as u32, y as u32).0[channel] >> shift
    }))
}

/// Save a picture as 8 or 16 bit rgb.
/// Luma and chroma pictures are stored without conversion, 4:2:2 chroma is repeated.
fn save_picture(path: &Path, picture: &Picture) -> Result<()> {
    let width = u32::try_from(picture.size.width())?;
    let height = u32::try_from(picture.size.height())?;

    let sample = |channel: usize, x: u32, y: u32| {
        let x = if channel != 0 && picture.format == ColorFormat::YCbCr422 { x / 2 } else { x };
        picture.get(channel, Vec2(x as usize, y as usize))
    };

    if picture.bits_per_component == 8 {
        let pixels = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([ 0, 1, 2 ].map(|channel| sample(channel, x, y) as u8))
        });

        pixels.save(path)?;
    }
    else {
        let shift = 16 - picture.bits_per_component;
        let pixels: ImageBuffer<Rgb<u16>, Vec<u16>> = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([ 0, 1, 2 ].map(|channel| sample(channel, x, y) << shift))
        });

        pixels.save(path)?;
    }

    log::info!("saved {}", path.display());
    Ok(())
}
