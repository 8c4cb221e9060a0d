//! Z-order (Morton) texel addressing.
//!
//! Swizzled textures tile their texels in 4×4 (or 4×4×4) chunks so that
//! neighboring texels in both axes stay in the same cache lines. Texture
//! allocations round every dimension up to a chunk multiple, so the chunk
//! grid always has backing storage.

/// Edge length of a swizzle chunk, in texels.
pub const TEXELS_PER_CHUNK: u32 = 4;

/// `log2(TEXELS_PER_CHUNK)`.
pub const CHUNK_SHIFT: u32 = TEXELS_PER_CHUNK.trailing_zeros();

const _: () = assert!(TEXELS_PER_CHUNK.is_power_of_two());

/// Memory layout of a texture's texels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TexelOrder {
    /// Linear row-major: `x + w * (y + h * z)`.
    #[default]
    Ordered,
    /// Z-order curve in 4×4(×4) chunks.
    Swizzled,
}

/// Rounds a dimension up to the chunk grid.
#[inline]
pub const fn chunk_pad(dim: u32) -> u32 {
    (dim + (TEXELS_PER_CHUNK - 1)) & !(TEXELS_PER_CHUNK - 1)
}

/// Swizzled index of a 2D coordinate. `width` is the texture's logical
/// width; the chunk grid uses the padded width.
#[inline]
pub const fn swizzle_2d_index(x: u32, y: u32, width: u32) -> usize {
    const IDS_PER_CHUNK: u32 = TEXELS_PER_CHUNK * TEXELS_PER_CHUNK;

    let tiles_per_row = chunk_pad(width) >> CHUNK_SHIFT;
    let tile_x = x >> CHUNK_SHIFT;
    let tile_y = y >> CHUNK_SHIFT;
    let tile_id = tile_x + tiles_per_row * tile_y;

    let inner_x = x & (TEXELS_PER_CHUNK - 1);
    let inner_y = y & (TEXELS_PER_CHUNK - 1);
    let inner_id = inner_x + (inner_y << CHUNK_SHIFT);

    (inner_id + tile_id * IDS_PER_CHUNK) as usize
}

/// Swizzled index of a 3D coordinate.
#[inline]
pub const fn swizzle_3d_index(x: u32, y: u32, z: u32, width: u32, height: u32) -> usize {
    const IDS_PER_CHUNK: u32 = TEXELS_PER_CHUNK * TEXELS_PER_CHUNK * TEXELS_PER_CHUNK;

    let tiles_per_row = chunk_pad(width) >> CHUNK_SHIFT;
    let tiles_per_col = chunk_pad(height) >> CHUNK_SHIFT;

    let tile_x = x >> CHUNK_SHIFT;
    let tile_y = y >> CHUNK_SHIFT;
    let tile_z = z >> CHUNK_SHIFT;
    let tile_id = tile_x + tiles_per_row * (tile_y + tiles_per_col * tile_z);

    let inner_x = x & (TEXELS_PER_CHUNK - 1);
    let inner_y = y & (TEXELS_PER_CHUNK - 1);
    let inner_z = z & (TEXELS_PER_CHUNK - 1);
    let inner_id = inner_x + (inner_y << CHUNK_SHIFT) + (inner_z << (CHUNK_SHIFT * 2));

    (inner_id + tile_id * IDS_PER_CHUNK) as usize
}
