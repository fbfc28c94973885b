
//! Pictures in their original colour format,
//! and their conversion to and from the planes that the slice codec operates on.
//!
//! Rgb samples are converted to YCoCg with a reversible integer transform,
//! where the chroma components have one more bit than the picture.
//! For 4:2:2 pictures, the chroma channels are upsampled before coding
//! and subsampled again after decoding.

use crate::compression::Planes;
use crate::compression::tables::COMPONENTS;
use crate::error::{Error, Result, UnitResult};
use crate::math::Vec2;
use crate::meta::Config;


/// How the three channels of a picture are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {

    /// Red, green and blue, all of full resolution.
    Rgb,

    /// Luma and two chroma channels, all of full resolution.
    YCbCr444,

    /// Luma and two chroma channels, where the chroma channels
    /// have half of the horizontal resolution.
    YCbCr422,
}

impl ColorFormat {

    /// The format that a configuration codes.
    pub fn of_config(config: &Config) -> Self {
        if config.convert_rgb { ColorFormat::Rgb }
        else if config.enable_422 { ColorFormat::YCbCr422 }
        else { ColorFormat::YCbCr444 }
    }
}


/// A picture of integer samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {

    /// Width and height in pixels.
    pub size: Vec2<usize>,

    pub format: ColorFormat,

    /// Bits of each sample, 8, 10, or 12.
    pub bits_per_component: u8,

    /// The samples of each channel, row by row.
    /// In 4:2:2 pictures, the rows of the chroma channels have half the width, rounded up.
    pub channels: [Vec<u16>; COMPONENTS],
}

impl Picture {

    /// A black picture.
    pub fn new(size: Vec2<usize>, format: ColorFormat, bits_per_component: u8) -> Self {
        Self::from_fn(size, format, bits_per_component, |_, _| 0)
    }

    /// Compute each sample from its channel index and position within the channel.
    pub fn from_fn(
        size: Vec2<usize>, format: ColorFormat, bits_per_component: u8,
        sample: impl Fn(usize, Vec2<usize>) -> u16
    ) -> Self
    {
        let channel = |channel: usize| {
            let channel_size = channel_size(size, format, channel);

            (0 .. channel_size.height())
                .flat_map(|y| (0 .. channel_size.width()).map(move |x| Vec2(x, y)))
                .map(|position| sample(channel, position))
                .collect()
        };

        Self { size, format, bits_per_component, channels: [ channel(0), channel(1), channel(2) ] }
    }

    /// The width and height of a channel.
    pub fn channel_size(&self, channel: usize) -> Vec2<usize> {
        channel_size(self.size, self.format, channel)
    }

    #[inline]
    pub fn get(&self, channel: usize, position: Vec2<usize>) -> u16 {
        let width = self.channel_size(channel).width();
        self.channels[channel][position.y() * width + position.x()]
    }

    /// Check that the samples match the size and the bit depth.
    pub fn validate(&self) -> UnitResult {
        if ![8, 10, 12].contains(&self.bits_per_component) {
            return Err(Error::unsupported("bits per component other than 8, 10, or 12"));
        }

        let max = (1_u32 << self.bits_per_component) - 1;

        for channel in 0 .. COMPONENTS {
            if self.channels[channel].len() != self.channel_size(channel).area() {
                return Err(Error::invalid("channel sample count does not match the picture size"));
            }

            if self.channels[channel].iter().any(|&sample| u32::from(sample) > max) {
                return Err(Error::invalid("sample exceeds the bits per component"));
            }
        }

        Ok(())
    }

    /// Check that the configuration codes pictures like this one.
    pub fn validate_for(&self, config: &Config) -> UnitResult {
        self.validate()?;

        if self.size != config.picture_size {
            return Err(Error::invalid("picture size does not match the configuration"));
        }

        if self.bits_per_component != config.bits_per_component {
            return Err(Error::invalid("bits per component do not match the configuration"));
        }

        if self.format != ColorFormat::of_config(config) {
            return Err(Error::invalid("colour format does not match the configuration"));
        }

        Ok(())
    }

    /// The samples in the coding domain of the configuration.
    pub fn to_planes(&self, config: &Config) -> Result<Planes> {
        self.validate_for(config)?;
        let bits = self.bits_per_component;

        Ok(match self.format {
            ColorFormat::Rgb => {
                let mut planes = Planes::new(self.size);

                for y in 0 .. self.size.height() {
                    for x in 0 .. self.size.width() {
                        let position = Vec2(x, y);
                        let rgb = [ self.get(0, position), self.get(1, position), self.get(2, position) ];

                        for (component, &value) in rgb_to_ycocg(rgb, bits).iter().enumerate() {
                            planes.set(component, position, value);
                        }
                    }
                }

                planes
            },

            ColorFormat::YCbCr444 => Planes {
                size: self.size,
                samples: self.channels.clone(),
            },

            // chroma samples at odd positions are interpolated, except at the right edge
            ColorFormat::YCbCr422 => Planes::from_fn(self.size, |component, Vec2(x, y)| {
                if component == 0 {
                    return self.get(0, Vec2(x, y));
                }

                let left = self.get(component, Vec2(x / 2, y));
                if x % 2 == 1 && x + 1 < self.size.width() {
                    let right = self.get(component, Vec2(x / 2 + 1, y));
                    ((u32::from(left) + u32::from(right)) >> 1) as u16
                }
                else {
                    left
                }
            }),
        })
    }

    /// Convert decoded planes back to the colour format of the configuration.
    pub fn from_planes(planes: &Planes, config: &Config) -> Self {
        let format = ColorFormat::of_config(config);
        let bits = config.bits_per_component;

        Self::from_fn(planes.size, format, bits, |channel, position| {
            match format {
                ColorFormat::Rgb => {
                    let ycocg = [ planes.get(0, position), planes.get(1, position), planes.get(2, position) ];
                    ycocg_to_rgb(ycocg, bits)[channel]
                },

                ColorFormat::YCbCr444 => planes.get(channel, position),

                // keep the chroma of even positions
                ColorFormat::YCbCr422 => {
                    if channel == 0 { planes.get(0, position) }
                    else { planes.get(channel, Vec2(position.x() * 2, position.y())) }
                },
            }
        })
    }

    /// The largest absolute difference of any two corresponding samples.
    /// Returns `None` if the pictures do not have the same layout.
    pub fn max_difference(&self, other: &Picture) -> Option<u16> {
        if self.size != other.size || self.format != other.format {
            return None;
        }

        self.channels.iter().zip(other.channels.iter())
            .flat_map(|(own, other)| own.iter().zip(other.iter()))
            .map(|(&own, &other)| if own > other { own - other } else { other - own })
            .max()
    }
}


fn channel_size(size: Vec2<usize>, format: ColorFormat, channel: usize) -> Vec2<usize> {
    if format == ColorFormat::YCbCr422 && channel != 0 {
        Vec2((size.width() + 1) / 2, size.height())
    }
    else {
        size
    }
}


/// The reversible colour transform from rgb to luma and two chroma samples.
/// The chroma samples are offset to be positive and have one more bit.
pub fn rgb_to_ycocg(rgb: [u16; 3], bits_per_component: u8) -> [u16; 3] {
    let [ red, green, blue ] = [ i32::from(rgb[0]), i32::from(rgb[1]), i32::from(rgb[2]) ];
    let half = 1 << (bits_per_component - 1);

    let co = red - blue;
    let t = blue + (co >> 1);
    let cg = green - t;
    let y = t + (cg >> 1);

    [ y as u16, (co + 2 * half) as u16, (cg + 2 * half) as u16 ]
}

/// Invert `rgb_to_ycocg`, clamping samples that the lossy coding moved out of range.
pub fn ycocg_to_rgb(ycocg: [u16; 3], bits_per_component: u8) -> [u16; 3] {
    let half = 1 << (bits_per_component - 1);
    let max = (1 << bits_per_component) - 1;

    let y = i32::from(ycocg[0]);
    let co = i32::from(ycocg[1]) - 2 * half;
    let cg = i32::from(ycocg[2]) - 2 * half;

    let t = y - (cg >> 1);
    let green = cg + t;
    let blue = t - (co >> 1);
    let red = co + blue;

    let clamp = |value: i32| value.max(0).min(max) as u16;
    [ clamp(red), clamp(green), clamp(blue) ]
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::Parameters;

    #[test]
    fn colour_transform_is_reversible() {
        for &rgb in &[ [0, 0, 0], [255, 255, 255], [255, 0, 0], [0, 255, 0], [0, 0, 255], [12, 200, 99] ] {
            let ycocg = rgb_to_ycocg(rgb, 8);
            assert!(ycocg[0] <= 255 && ycocg[1] <= 511 && ycocg[2] <= 511);
            assert_eq!(ycocg_to_rgb(ycocg, 8), rgb);
        }

        assert_eq!(rgb_to_ycocg([ 128, 128, 128 ], 8), [ 128, 256, 256 ]);
        assert_eq!(ycocg_to_rgb(rgb_to_ycocg([ 1023, 5, 700 ], 10), 10), [ 1023, 5, 700 ]);
    }

    #[test]
    fn out_of_range_reconstructions_are_clamped() {
        assert_eq!(ycocg_to_rgb([ 255, 511, 256 ], 8), [ 255, 255, 128 ]);
    }

    #[test]
    fn chroma_422_is_interpolated() {
        let size = Vec2(64, 64);
        let picture = Picture::from_fn(size, ColorFormat::YCbCr422, 8, |channel, Vec2(x, _)| {
            if channel == 0 { 50 } else { (x * 4) as u16 }
        });

        assert_eq!(picture.channel_size(1), Vec2(32, 64));

        let parameters = Parameters { convert_rgb: false, enable_422: true, .. Parameters::default() };
        let config = parameters.setup(size).unwrap().config;

        let planes = picture.to_planes(&config).unwrap();
        assert_eq!(&planes.samples[1][.. 6], &[ 0, 2, 4, 6, 8, 10 ]);
        assert_eq!(&planes.samples[2][60 .. 64], &[ 120, 122, 124, 124 ]);

        let back = Picture::from_planes(&planes, &config);
        assert_eq!(back, picture);
    }

    #[test]
    fn mismatching_pictures_are_rejected() {
        let config = Parameters::default().setup(Vec2(64, 64)).unwrap().config;

        let picture = Picture::new(Vec2(64, 32), ColorFormat::Rgb, 8);
        assert!(picture.to_planes(&config).is_err());

        let picture = Picture::new(Vec2(64, 64), ColorFormat::YCbCr444, 8);
        assert!(picture.to_planes(&config).is_err());

        let mut picture = Picture::new(Vec2(64, 64), ColorFormat::Rgb, 8);
        picture.channels[2][7] = 256;
        assert!(picture.to_planes(&config).is_err());

        picture.channels[2][7] = 255;
        assert!(picture.to_planes(&config).is_ok());
    }
}
