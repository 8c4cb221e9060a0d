//! The post-transform vertex cache.
//!
//! A tiny direct-mapped cache in front of the vertex shader. Meshes with
//! shared vertices (indexed cubes, grids, strips) hit the cache for most
//! repeated indices, which skips whole shader invocations. Collisions
//! simply evict: the cache is per-thread scratch, not a sharing primitive,
//! and assumes vertex shaders are pure functions of their inputs.

use super::{TransformedVert, PTV_CACHE_SIZE};

const CACHE_MISS: u64 = u64::MAX;

pub struct PtvCache {
    indices: [u64; PTV_CACHE_SIZE],
    vertices: [TransformedVert; PTV_CACHE_SIZE],
}

impl PtvCache {
    pub fn new() -> Self {
        Self {
            indices: [CACHE_MISS; PTV_CACHE_SIZE],
            vertices: [TransformedVert::default(); PTV_CACHE_SIZE],
        }
    }

    /// Marks every slot as a miss.
    pub fn reset(&mut self) {
        self.indices = [CACHE_MISS; PTV_CACHE_SIZE];
    }

    /// Copies the transformed vertex for `key` into `out`, invoking
    /// `transform` only on a miss. The copy is one position plus four
    /// varyings, a fixed five-vector move.
    #[inline]
    pub fn query_or_update<F>(&mut self, key: usize, out: &mut TransformedVert, transform: &mut F)
    where
        F: FnMut(usize, &mut TransformedVert),
    {
        let slot = key & (PTV_CACHE_SIZE - 1);

        if self.indices[slot] != key as u64 {
            self.indices[slot] = key as u64;
            transform(key, &mut self.vertices[slot]);
        }

        *out = self.vertices[slot];
    }
}

impl Default for PtvCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::{PtvCache, PTV_CACHE_SIZE};
    use crate::pipeline::TransformedVert;

    #[test]
    fn repeated_keys_hit() {
        let mut cache = PtvCache::new();
        let mut calls = 0usize;
        let mut out = TransformedVert::default();

        let mut transform = |key: usize, tv: &mut TransformedVert| {
            calls += 1;
            tv.vert = Vec4::splat(key as f32);
        };

        cache.query_or_update(3, &mut out, &mut transform);
        assert_eq!(out.vert, Vec4::splat(3.0));
        cache.query_or_update(3, &mut out, &mut transform);
        cache.query_or_update(3, &mut out, &mut transform);

        assert_eq!(calls, 1);
        assert_eq!(out.vert, Vec4::splat(3.0));
    }

    #[test]
    fn colliding_keys_evict() {
        let mut cache = PtvCache::new();
        let mut calls = 0usize;
        let mut out = TransformedVert::default();

        let mut transform = |key: usize, tv: &mut TransformedVert| {
            calls += 1;
            tv.vert = Vec4::splat(key as f32);
        };

        // Same slot, different keys.
        cache.query_or_update(1, &mut out, &mut transform);
        cache.query_or_update(1 + PTV_CACHE_SIZE, &mut out, &mut transform);
        assert_eq!(out.vert, Vec4::splat((1 + PTV_CACHE_SIZE) as f32));
        cache.query_or_update(1, &mut out, &mut transform);

        assert_eq!(calls, 3);
    }

    #[test]
    fn shared_vertex_cube_hits_at_least_once_per_vertex() {
        // 8 unique vertices referenced 24 times; with 8 slots every vertex
        // keeps its own slot, so 16 of the lookups hit.
        let indices: Vec<usize> = (0..24).map(|i| i % 8).collect();

        let mut cache = PtvCache::new();
        let mut calls = 0usize;
        let mut out = TransformedVert::default();
        let mut transform = |_: usize, _: &mut TransformedVert| calls += 1;

        for &i in &indices {
            cache.query_or_update(i, &mut out, &mut transform);
        }

        assert_eq!(calls, 8);
    }

    #[test]
    fn reset_invalidates() {
        let mut cache = PtvCache::new();
        let mut calls = 0usize;
        let mut out = TransformedVert::default();
        let mut transform = |_: usize, _: &mut TransformedVert| calls += 1;

        cache.query_or_update(0, &mut out, &mut transform);
        cache.reset();
        cache.query_or_update(0, &mut out, &mut transform);

        assert_eq!(calls, 2);
    }

    #[test]
    fn varyings_are_cached_with_the_position() {
        let mut cache = PtvCache::new();
        let mut out = TransformedVert::default();

        let mut transform = |key: usize, tv: &mut TransformedVert| {
            tv.vert = Vec4::ONE;
            tv.varyings[0] = Vec4::splat(key as f32 * 2.0);
        };

        cache.query_or_update(5, &mut out, &mut transform);
        let mut transform_never = |_: usize, _: &mut TransformedVert| panic!("expected a hit");
        cache.query_or_update(5, &mut out, &mut transform_never);

        assert_eq!(out.varyings[0], Vec4::splat(10.0));
    }
}
