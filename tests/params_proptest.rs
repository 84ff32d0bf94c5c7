// Property-based tests for parameter resolution and the header codec

use proptest::prelude::*;
use vid2bnd::engine::{
    BundleHeader, EncodeOptions, EncodeParams, Rational, Scale, SourceInfo, HEADER_SIZE,
};

fn arb_source() -> impl Strategy<Value = SourceInfo> {
    (
        1u32..4000,
        1u32..4000,
        1u64..120_000,
        1u64..1002,
        0u64..100_000,
        1u32..200_000,
    )
        .prop_map(
            |(width, height, rate_num, rate_den, frame_count, sample_rate)| SourceInfo {
                width,
                height,
                frame_rate: Rational::new(rate_num, rate_den),
                frame_count,
                sample_rate,
            },
        )
}

proptest! {
    #[test]
    fn resolved_params_hold_their_invariants(source in arb_source()) {
        let resolved = EncodeParams::resolve(&source, &EncodeOptions::default());
        // Extreme aspect ratios collapse a dimension to zero and are
        // rejected; everything else must resolve.
        prop_assume!(resolved.is_ok());
        let params = resolved.unwrap();

        prop_assert!(params.pre_pad_width >= 1 && params.pre_pad_width <= 128);
        prop_assert!(params.frame_height >= 1 && params.frame_height <= 64);
        prop_assert_eq!(params.frame_width % 8, 0);
        prop_assert!(params.frame_width > params.pre_pad_width);
        prop_assert!(params.frame_width - params.pre_pad_width <= 8);
        prop_assert_eq!(
            params.frame_size * 8,
            params.frame_width as u64 * params.frame_height as u64
        );
        prop_assert_eq!(
            params.estimated_file_size,
            HEADER_SIZE as u64 + params.frame_count * (params.frame_size + params.audio_chunk_size)
        );
    }

    #[test]
    fn explicit_scale_accepted_exactly_when_it_fits(width in 0u32..200, height in 0u32..120) {
        let source = SourceInfo {
            width: 640,
            height: 480,
            frame_rate: Rational::from(30),
            frame_count: 10,
            sample_rate: 8000,
        };
        let opts = EncodeOptions {
            scale: Some(Scale { width, height }),
            ..Default::default()
        };
        let fits = (1..=128).contains(&width) && (1..=64).contains(&height);
        prop_assert_eq!(EncodeParams::resolve(&source, &opts).is_ok(), fits);
    }

    #[test]
    fn audio_chunks_never_overshoot_the_sample_budget(
        sample_rate in 1u32..200_000,
        num in 1u64..120_000,
        den in 1u64..1002,
    ) {
        let source = SourceInfo {
            width: 640,
            height: 480,
            frame_rate: Rational::new(num, den),
            frame_count: 100,
            sample_rate,
        };
        let params = EncodeParams::resolve(&source, &EncodeOptions::default()).unwrap();

        let exact = sample_rate as u64 * params.frame_rate.den();
        prop_assert!(params.audio_chunk_size * params.frame_rate.num() <= exact);
        prop_assert!((params.audio_chunk_size + 1) * params.frame_rate.num() > exact);
        prop_assert_eq!(
            params.audio_chunk_size * params.frame_rate.num() + params.audio_remainder,
            exact
        );
    }

    #[test]
    fn header_codec_round_trips(
        version in any::<u8>(),
        frame_count in any::<u32>(),
        audio_chunk_size in any::<u16>(),
        sample_rate in any::<u16>(),
        frame_height in any::<u8>(),
        frame_width in any::<u8>(),
    ) {
        let header = BundleHeader {
            version,
            frame_count,
            audio_chunk_size,
            sample_rate,
            frame_height,
            frame_width,
        };
        let bytes = header.encode();
        prop_assert_eq!(BundleHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn rational_survives_display_and_reparse(num in 1u64..1_000_000, den in 1u64..100_000) {
        let rate = Rational::new(num, den);
        let reparsed: Rational = rate.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, rate);
    }
}
