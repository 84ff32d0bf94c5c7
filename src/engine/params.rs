/// Parameter resolution: geometry, rates and derived sizes.
///
/// Everything in this module is pure integer and rational arithmetic;
/// probing and stream I/O live elsewhere. `EncodeParams` is computed once
/// up front and never mutated afterwards.
use std::fmt;
use std::str::FromStr;

use crate::engine::error::EncodeError;
use crate::engine::header::HEADER_SIZE;
use crate::engine::probe::SourceInfo;

/// Target display raster.
pub const DISPLAY_WIDTH: u32 = 128;
pub const DISPLAY_HEIGHT: u32 = 64;

/// An exact frame rate as a reduced fraction. ffprobe reports rates like
/// `30000/1001`; keeping them rational keeps the frame count math free of
/// float drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    num: u64,
    den: u64,
}

impl Rational {
    pub fn new(num: u64, den: u64) -> Self {
        assert!(den > 0, "denominator must be positive");
        let g = gcd(num, den);
        if g > 1 {
            Self {
                num: num / g,
                den: den / g,
            }
        } else {
            Self { num, den }
        }
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl From<u32> for Rational {
    fn from(value: u32) -> Self {
        Self {
            num: value as u64,
            den: 1,
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Cross-multiply in u128 so large ffprobe rates cannot overflow.
        let lhs = self.num as u128 * other.den as u128;
        let rhs = other.num as u128 * self.den as u128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Rational {
    type Err = String;

    /// Accepts `30`, `30000/1001` and decimals like `23.976`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            let num: u64 = num
                .parse()
                .map_err(|_| format!("invalid numerator in '{}'", s))?;
            let den: u64 = den
                .parse()
                .map_err(|_| format!("invalid denominator in '{}'", s))?;
            if den == 0 {
                return Err(format!("zero denominator in '{}'", s));
            }
            Ok(Self::new(num, den))
        } else if let Some((whole, frac)) = s.split_once('.') {
            if frac.len() > 9 {
                return Err(format!("too many decimal places in '{}'", s));
            }
            let whole: u64 = if whole.is_empty() {
                0
            } else {
                whole
                    .parse()
                    .map_err(|_| format!("invalid number '{}'", s))?
            };
            let frac_value: u64 = if frac.is_empty() {
                0
            } else {
                frac.parse().map_err(|_| format!("invalid number '{}'", s))?
            };
            let den = 10u64.pow(frac.len() as u32);
            let num = whole
                .checked_mul(den)
                .and_then(|n| n.checked_add(frac_value))
                .ok_or_else(|| format!("number out of range '{}'", s))?;
            Ok(Self::new(num, den))
        } else {
            let num: u64 = s.parse().map_err(|_| format!("invalid number '{}'", s))?;
            Ok(Self::new(num, 1))
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Explicit output geometry, parsed from `WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
        let width: u32 = w.parse().map_err(|_| format!("invalid width in '{}'", s))?;
        let height: u32 = h
            .parse()
            .map_err(|_| format!("invalid height in '{}'", s))?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// User overrides applied on top of probed source values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub scale: Option<Scale>,
    pub frame_rate: Option<Rational>,
    pub sample_rate: Option<u32>,
}

/// Every derived value the encoder needs, resolved once from the probed
/// source plus user overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeParams {
    pub source: SourceInfo,
    /// Visible width before byte-alignment padding.
    pub pre_pad_width: u32,
    pub frame_height: u32,
    /// Stored width, padded to a multiple of 8.
    pub frame_width: u32,
    /// Bytes in one packed 1-bit frame.
    pub frame_size: u64,
    pub frame_rate: Rational,
    pub sample_rate: u32,
    /// Bytes of 8-bit audio accompanying each frame.
    pub audio_chunk_size: u64,
    /// Leftover from the chunk-size floor division: audio falls this many
    /// samples behind video per `frame_rate.num()` frames. Reported as a
    /// warning, not corrected.
    pub audio_remainder: u64,
    pub frame_count: u64,
    pub estimated_file_size: u64,
}

impl EncodeParams {
    /// Resolve all derived parameters. Pure; fails fast on out-of-range
    /// geometry or zero rates, before anything external is started.
    pub fn resolve(source: &SourceInfo, opts: &EncodeOptions) -> Result<Self, EncodeError> {
        let (pre_pad_width, frame_height) = match opts.scale {
            Some(scale) => {
                if scale.width < 1
                    || scale.width > DISPLAY_WIDTH
                    || scale.height < 1
                    || scale.height > DISPLAY_HEIGHT
                {
                    return Err(EncodeError::InvalidGeometry {
                        width: scale.width,
                        height: scale.height,
                    });
                }
                (scale.width, scale.height)
            }
            None => best_fit(source.width, source.height),
        };
        if pre_pad_width == 0 || frame_height == 0 {
            // Extreme aspect ratios collapse one dimension to zero.
            return Err(EncodeError::InvalidGeometry {
                width: pre_pad_width,
                height: frame_height,
            });
        }

        // Pad the visible width up to a byte boundary. An already aligned
        // width still gains a full 8 white columns (128 pads to 136);
        // existing players expect exactly this layout, so it stays.
        let frame_width = pre_pad_width + (8 - pre_pad_width % 8);
        let frame_size = frame_width as u64 * frame_height as u64 / 8;

        let frame_rate = opts.frame_rate.unwrap_or(source.frame_rate);
        let sample_rate = opts.sample_rate.unwrap_or(source.sample_rate);
        if frame_rate.is_zero() {
            return Err(EncodeError::InvalidRate {
                field: "frame rate",
            });
        }
        if sample_rate == 0 {
            return Err(EncodeError::InvalidRate {
                field: "sample rate",
            });
        }

        // Samples per frame is sample_rate / frame_rate, floored. Taken
        // in u128 so an extreme explicit rate cannot overflow the
        // product; a quotient past u64 saturates and fails the header's
        // field-width check.
        let samples_exact = sample_rate as u128 * frame_rate.den() as u128;
        let audio_chunk_size =
            u64::try_from(samples_exact / frame_rate.num() as u128).unwrap_or(u64::MAX);
        let audio_remainder = (samples_exact % frame_rate.num() as u128) as u64;

        let frame_count = scaled_frame_count(source.frame_count, frame_rate, source.frame_rate);

        // Advisory; params that fit the header's field widths can never
        // saturate this.
        let per_frame = frame_size.saturating_add(audio_chunk_size);
        let estimated_file_size =
            (HEADER_SIZE as u64).saturating_add(frame_count.saturating_mul(per_frame));

        Ok(Self {
            source: source.clone(),
            pre_pad_width,
            frame_height,
            frame_width,
            frame_size,
            frame_rate,
            sample_rate,
            audio_chunk_size,
            audio_remainder,
            frame_count,
            estimated_file_size,
        })
    }

    /// Frames ffmpeg will duplicate to reach a target rate above the
    /// source rate.
    pub fn duplicated_frames(&self) -> u64 {
        self.frame_count.saturating_sub(self.source.frame_count)
    }

    /// Frames ffmpeg will drop to reach a target rate below the source
    /// rate.
    pub fn dropped_frames(&self) -> u64 {
        self.source.frame_count.saturating_sub(self.frame_count)
    }
}

/// Largest geometry that fits the display while preserving aspect ratio:
/// both dimensions divided by `max(w/128, h/64)`, floored.
fn best_fit(source_width: u32, source_height: u32) -> (u32, u32) {
    let w = source_width as u64;
    let h = source_height as u64;
    if w * DISPLAY_HEIGHT as u64 >= h * DISPLAY_WIDTH as u64 {
        // Width is the binding constraint.
        (DISPLAY_WIDTH, (h * DISPLAY_WIDTH as u64 / w) as u32)
    } else {
        ((w * DISPLAY_HEIGHT as u64 / h) as u32, DISPLAY_HEIGHT)
    }
}

/// Frame count after rate conversion, with ties rounding up to match the
/// fps filter's own rounding.
fn scaled_frame_count(source_frames: u64, target: Rational, source: Rational) -> u64 {
    let num = (source_frames as u128)
        .saturating_mul(target.num() as u128)
        .saturating_mul(source.den() as u128);
    let den = (target.den() as u128).saturating_mul(source.num() as u128);
    u64::try_from(half_round_up(num, den)).unwrap_or(u64::MAX)
}

fn half_round_up(num: u128, den: u128) -> u128 {
    // (2n + d) / 2d without the doubling, which can leave u128 range.
    let whole = num / den;
    if (num % den).saturating_mul(2) >= den {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_1280x720() -> SourceInfo {
        SourceInfo {
            width: 1280,
            height: 720,
            frame_rate: Rational::new(30000, 1001),
            frame_count: 900,
            sample_rate: 48000,
        }
    }

    #[test]
    fn test_rational_parse_integer() {
        let r: Rational = "30".parse().unwrap();
        assert_eq!((r.num(), r.den()), (30, 1));
    }

    #[test]
    fn test_rational_parse_fraction() {
        let r: Rational = "30000/1001".parse().unwrap();
        assert_eq!((r.num(), r.den()), (30000, 1001));

        // Reduced on construction
        let r: Rational = "60/2".parse().unwrap();
        assert_eq!((r.num(), r.den()), (30, 1));
    }

    #[test]
    fn test_rational_parse_decimal() {
        let r: Rational = "23.976".parse().unwrap();
        assert_eq!((r.num(), r.den()), (2997, 125));

        let r: Rational = "0.5".parse().unwrap();
        assert_eq!((r.num(), r.den()), (1, 2));
    }

    #[test]
    fn test_rational_parse_rejects_garbage() {
        assert!("".parse::<Rational>().is_err());
        assert!("abc".parse::<Rational>().is_err());
        assert!("30/0".parse::<Rational>().is_err());
        assert!("-5".parse::<Rational>().is_err());
    }

    #[test]
    fn test_rational_ordering() {
        let ntsc = Rational::new(30000, 1001);
        assert!(ntsc < Rational::from(30));
        assert!(ntsc > Rational::from(29));
        assert_eq!(Rational::new(60, 2), Rational::from(30));
    }

    #[test]
    fn test_rational_display() {
        assert_eq!(Rational::from(30).to_string(), "30");
        assert_eq!(Rational::new(30000, 1001).to_string(), "30000/1001");
    }

    #[test]
    fn test_scale_parse() {
        let s: Scale = "128x64".parse().unwrap();
        assert_eq!((s.width, s.height), (128, 64));
        assert!("128".parse::<Scale>().is_err());
        assert!("128x".parse::<Scale>().is_err());
        assert!("ax64".parse::<Scale>().is_err());
    }

    #[test]
    fn test_half_round_up() {
        assert_eq!(half_round_up(5, 2), 3);
        assert_eq!(half_round_up(7, 2), 4);
        assert_eq!(half_round_up(4, 2), 2);
        assert_eq!(half_round_up(0, 7), 0);
    }

    #[test]
    fn test_best_fit_landscape() {
        assert_eq!(best_fit(1280, 720), (113, 64));
        assert_eq!(best_fit(1920, 1080), (113, 64));
        assert_eq!(best_fit(640, 480), (85, 64));
    }

    #[test]
    fn test_best_fit_wide() {
        // Width-limited: 4:1 is wider than the 2:1 display.
        assert_eq!(best_fit(256, 64), (128, 32));
        // Exact 2:1 fills the display.
        assert_eq!(best_fit(256, 128), (128, 64));
    }

    #[test]
    fn test_resolve_ntsc_720p() {
        let params = EncodeParams::resolve(&source_1280x720(), &EncodeOptions::default()).unwrap();
        assert_eq!(params.pre_pad_width, 113);
        assert_eq!(params.frame_height, 64);
        assert_eq!(params.frame_width, 120);
        assert_eq!(params.frame_size, 960);
        assert_eq!(params.audio_chunk_size, 1601);
        assert_eq!(params.frame_count, 900);
        assert_eq!(
            params.estimated_file_size,
            18 + 900 * (960 + 1601)
        );
    }

    #[test]
    fn test_resolve_padding_always_adds() {
        let opts = EncodeOptions {
            scale: Some(Scale {
                width: 128,
                height: 64,
            }),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source_1280x720(), &opts).unwrap();
        // Already byte-aligned widths still gain a full byte of padding.
        assert_eq!(params.frame_width, 136);
        assert_eq!(params.frame_size, 136 * 64 / 8);
    }

    #[test]
    fn test_resolve_rejects_bad_geometry() {
        for (w, h) in [(0, 10), (129, 64), (128, 65), (200, 200)] {
            let opts = EncodeOptions {
                scale: Some(Scale {
                    width: w,
                    height: h,
                }),
                ..Default::default()
            };
            let err = EncodeParams::resolve(&source_1280x720(), &opts).unwrap_err();
            assert!(matches!(err, EncodeError::InvalidGeometry { .. }));
        }
    }

    #[test]
    fn test_resolve_rejects_zero_sample_rate() {
        let opts = EncodeOptions {
            sample_rate: Some(0),
            ..Default::default()
        };
        let err = EncodeParams::resolve(&source_1280x720(), &opts).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidRate { .. }));
    }

    #[test]
    fn test_resolve_audio_remainder() {
        // 48000 Hz at 30000/1001 fps: 48048000 / 30000 leaves 18000.
        let params = EncodeParams::resolve(&source_1280x720(), &EncodeOptions::default()).unwrap();
        assert_eq!(params.audio_remainder, 18000);

        // An even division leaves none.
        let opts = EncodeOptions {
            frame_rate: Some(Rational::from(30)),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source_1280x720(), &opts).unwrap();
        assert_eq!(params.audio_chunk_size, 1600);
        assert_eq!(params.audio_remainder, 0);
    }

    #[test]
    fn test_resolve_rate_conversion_counts() {
        let source = SourceInfo {
            frame_rate: Rational::from(30),
            ..source_1280x720()
        };
        let doubled = EncodeOptions {
            frame_rate: Some(Rational::from(60)),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source, &doubled).unwrap();
        assert_eq!(params.frame_count, 1800);
        assert_eq!(params.duplicated_frames(), 900);
        assert_eq!(params.dropped_frames(), 0);

        let halved = EncodeOptions {
            frame_rate: Some(Rational::from(15)),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source, &halved).unwrap();
        assert_eq!(params.frame_count, 450);
        assert_eq!(params.dropped_frames(), 450);
    }

    #[test]
    fn test_resolve_frame_count_rounds_half_up() {
        // 3 frames from 2 fps to 3 fps is exactly 4.5, which rounds to 5.
        let source = SourceInfo {
            frame_rate: Rational::from(2),
            frame_count: 3,
            ..source_1280x720()
        };
        let opts = EncodeOptions {
            frame_rate: Some(Rational::from(3)),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source, &opts).unwrap();
        assert_eq!(params.frame_count, 5);
    }

    #[test]
    fn test_resolve_extreme_frame_rate_saturates_audio_chunk() {
        // 48000 samples over one frame per 2^50 seconds: the chunk does
        // not fit u64. It must saturate, not wrap or panic.
        let opts = EncodeOptions {
            frame_rate: Some(Rational::new(1, 1u64 << 50)),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source_1280x720(), &opts).unwrap();
        assert_eq!(params.audio_chunk_size, u64::MAX);
        assert_eq!(params.frame_count, 0);
        assert_eq!(params.estimated_file_size, 18);
    }

    #[test]
    fn test_resolve_extreme_target_rate_saturates_frame_count() {
        let opts = EncodeOptions {
            frame_rate: Some(Rational::new(1u64 << 60, 1)),
            ..Default::default()
        };
        let params = EncodeParams::resolve(&source_1280x720(), &opts).unwrap();
        assert_eq!(params.frame_count, u64::MAX);
        assert_eq!(params.audio_chunk_size, 0);
        assert_eq!(params.estimated_file_size, u64::MAX);
    }
}
