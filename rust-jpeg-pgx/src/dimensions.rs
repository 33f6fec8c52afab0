use crate::image::{ComponentInfo, RawImageInfo};

/// Side length of a DCT block in samples.
pub const BLOCK_SIZE: usize = 8;

/// Padded and exact sizes of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentExtent {
    /// Size of the block-aligned sample buffer, (width, height)
    pub padded: (usize, usize),
    /// Size of the component's real samples, (width, height)
    pub clipped: (usize, usize),
}

impl ComponentExtent {
    /// Whether the clipped size lies within the padded size.
    pub fn fits(&self) -> bool {
        self.clipped.0 <= self.padded.0 && self.clipped.1 <= self.padded.1
    }
}

/// Component dimensions after clipping, following ITU T.81 A.1.1:
/// `ceil(X * H / Hmax)` by `ceil(Y * V / Vmax)`.
pub fn clipped_extent(
    output_size: (usize, usize),
    sampling_factor: (u8, u8),
    max_sampling_factor: (u8, u8),
) -> (usize, usize) {
    (
        (output_size.0 * sampling_factor.0 as usize).div_ceil(max_sampling_factor.0 as usize),
        (output_size.1 * sampling_factor.1 as usize).div_ceil(max_sampling_factor.1 as usize),
    )
}

/// Size of a component's block-aligned sample buffer.
pub fn padded_extent(component: &ComponentInfo) -> (usize, usize) {
    (
        component.size_in_blocks.0 * BLOCK_SIZE,
        component.size_in_blocks.1 * BLOCK_SIZE,
    )
}

/// Number of blocks needed to cover a component's clipped extent.
pub fn blocks_for(clipped: (usize, usize)) -> (usize, usize) {
    (clipped.0.div_ceil(BLOCK_SIZE), clipped.1.div_ceil(BLOCK_SIZE))
}

/// Extents of every component, in component order.
pub fn component_extents(info: &RawImageInfo) -> Vec<ComponentExtent> {
    info.components
        .iter()
        .map(|component| ComponentExtent {
            padded: padded_extent(component),
            clipped: clipped_extent(
                info.size,
                component.sampling_factor,
                info.max_sampling_factor,
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_resolution_component_keeps_output_size() {
        assert_eq!(clipped_extent((227, 149), (2, 2), (2, 2)), (227, 149));
        assert_eq!(clipped_extent((1, 1), (1, 1), (1, 1)), (1, 1));
    }

    #[test]
    fn subsampled_dimensions_round_up() {
        assert_eq!(clipped_extent((100, 100), (1, 1), (2, 2)), (50, 50));
        assert_eq!(clipped_extent((101, 100), (1, 1), (2, 2)), (51, 50));
        assert_eq!(clipped_extent((17, 9), (1, 1), (2, 2)), (9, 5));
        // 4:1:1 and 3-way factors
        assert_eq!(clipped_extent((13, 13), (1, 1), (4, 1)), (4, 13));
        assert_eq!(clipped_extent((10, 10), (2, 1), (3, 3)), (7, 4));
    }

    #[test]
    fn extents_for_420_image() {
        let info = RawImageInfo {
            size: (17, 9),
            precision: 8,
            max_sampling_factor: (2, 2),
            components: vec![
                ComponentInfo {
                    index: 0,
                    identifier: 1,
                    sampling_factor: (2, 2),
                    size_in_blocks: (3, 2),
                },
                ComponentInfo {
                    index: 1,
                    identifier: 2,
                    sampling_factor: (1, 1),
                    size_in_blocks: (2, 1),
                },
            ],
        };

        assert_eq!(
            component_extents(&info),
            vec![
                ComponentExtent {
                    padded: (24, 16),
                    clipped: (17, 9),
                },
                ComponentExtent {
                    padded: (16, 8),
                    clipped: (9, 5),
                },
            ]
        );
    }

    #[test]
    fn clipped_never_exceeds_padded() {
        arbtest::arbtest(|u| {
            let size = (
                u.int_in_range(1..=65535usize)?,
                u.int_in_range(1..=65535usize)?,
            );
            let max_sampling = (u.int_in_range(1..=4u8)?, u.int_in_range(1..=4u8)?);
            let sampling = (
                u.int_in_range(1..=max_sampling.0)?,
                u.int_in_range(1..=max_sampling.1)?,
            );

            let clipped = clipped_extent(size, sampling, max_sampling);
            let component = ComponentInfo {
                index: 0,
                identifier: 1,
                sampling_factor: sampling,
                size_in_blocks: blocks_for(clipped),
            };
            let padded = padded_extent(&component);

            assert!(ComponentExtent { padded, clipped }.fits());
            assert!(padded.0 - clipped.0 < BLOCK_SIZE && padded.1 - clipped.1 < BLOCK_SIZE);
            // Never truncated: scaling back up covers the whole image.
            assert!(clipped.0 * max_sampling.0 as usize >= size.0 * sampling.0 as usize);
            assert!(clipped.1 * max_sampling.1 as usize >= size.1 * sampling.1 as usize);
            Ok(())
        });
    }
}
