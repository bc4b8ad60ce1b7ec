//! Band arithmetic for single-band rendering.
//!
//! An expression is parsed once into a [`Node`] tree. The tree is evaluated
//! per pixel on the CPU path and compiled into WGSL on the GPU path; its
//! canonical text keys the shader program cache.

pub mod ast;
mod parser;

pub use ast::{BinaryOp, Function, Node, UnaryOp};

use crate::error::Result;

/// Parsed band expression such as `(b2 - b1) / (b2 + b1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Node,
    canonical: String,
    bands: Vec<usize>,
}

impl Expression {
    /// Parse an expression. Band identifiers `bN` and `bandN` are 1-based.
    pub fn parse(input: &str) -> Result<Self> {
        let root = parser::parse(input)?;
        let canonical = root.to_string();
        let mut bands = Vec::new();
        root.collect_bands(&mut bands);
        bands.sort_unstable();
        bands.dedup();
        Ok(Self { root, canonical, bands })
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Fully parenthesized form. Equal trees have equal canonical text.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Distinct 0-based band indices referenced, ascending.
    #[must_use]
    pub fn bands(&self) -> &[usize] {
        &self.bands
    }

    /// Evaluate with `values[i]` holding band `i`.
    #[inline]
    #[must_use]
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.root.eval(values)
    }

    /// WGSL `f32` expression reading band `i` through `band(i)`.
    #[must_use]
    pub fn to_wgsl(&self, band: &dyn Fn(usize) -> String) -> String {
        let mut out = String::new();
        self.root.write_wgsl(&mut out, band);
        out
    }
}

impl std::str::FromStr for Expression {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
