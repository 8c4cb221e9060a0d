//! Wireframe triangles: the triangle bin rasterized as its three edges.

use super::{line, FragmentContext};
use crate::pipeline::FragmentBin;

pub(crate) fn rasterize(ctx: &mut FragmentContext<'_>, bin: &FragmentBin) {
    line::rasterize_edge(ctx, bin, 0, 1);
    line::rasterize_edge(ctx, bin, 1, 2);
    line::rasterize_edge(ctx, bin, 2, 0);
}
