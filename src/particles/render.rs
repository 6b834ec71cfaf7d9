use super::definition::AnimationFrame;
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// One corner of a particle quad. Four consecutive vertices form a quad in
/// upper-left, upper-right, lower-right, lower-left order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub tex_coord: [f32; 2],
}

pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;

/// Texture coordinates matching the corner order above.
pub const QUAD_TEX_COORDS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    Opaque,
    #[default]
    Alpha,
    Additive,
}

impl BlendMode {
    /// Maps the integer codes used by effect descriptions.
    pub fn from_index(value: i64) -> Option<Self> {
        match value {
            0 => Some(BlendMode::Opaque),
            1 => Some(BlendMode::Alpha),
            2 => Some(BlendMode::Additive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
pub enum StencilOp {
    #[serde(rename = "incr")]
    Increment,
    #[serde(rename = "decr")]
    Decrement,
    #[serde(rename = "zero")]
    Zero,
    #[default]
    #[serde(rename = "one")]
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilMode {
    #[default]
    Disabled,
    /// Particles write into the stencil buffer with the given operation.
    Write(StencilOp),
    /// Particles only draw where the stencil value equals one.
    Test,
}

impl StencilMode {
    pub fn from_flags(modify_stencil: bool, stencil_op: StencilOp, use_stencil: bool) -> Self {
        if modify_stencil {
            StencilMode::Write(stencil_op)
        } else if use_stencil {
            StencilMode::Test
        } else {
            StencilMode::Disabled
        }
    }
}

/// One quad-list draw call worth of particles.
#[derive(Debug, Clone, Copy)]
pub struct ParticleDrawBatch<'a> {
    pub vertices: &'a [ParticleVertex],
    pub frame: &'a AnimationFrame,
    pub blend_mode: BlendMode,
    pub stencil: StencilMode,
}

impl ParticleDrawBatch<'_> {
    pub fn quad_count(&self) -> usize {
        self.vertices.len() / VERTICES_PER_QUAD
    }
}

/// Receives particle draw calls. Implementations may draw immediately or
/// stage batches for a later GPU submission.
pub trait ParticleRenderer {
    fn draw_quads(&mut self, batch: &ParticleDrawBatch<'_>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub vertices: Vec<ParticleVertex>,
    pub frame_path: PathBuf,
    pub blend_mode: BlendMode,
    pub stencil: StencilMode,
}

/// Keeps copies of every batch; used by headless tools and tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub batches: Vec<RecordedBatch>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }

    pub fn total_quads(&self) -> usize {
        self.batches.iter().map(|batch| batch.vertices.len() / VERTICES_PER_QUAD).sum()
    }
}

impl ParticleRenderer for RecordingRenderer {
    fn draw_quads(&mut self, batch: &ParticleDrawBatch<'_>) -> Result<()> {
        self.batches.push(RecordedBatch {
            vertices: batch.vertices.to_vec(),
            frame_path: batch.frame.path.clone(),
            blend_mode: batch.blend_mode,
            stencil: batch.stencil,
        });
        Ok(())
    }
}
