//! Combinators that build flows out of other flows.
//!
//! Every combinator owns its children as boxed [`Flow`] objects, takes a flat
//! parameter vector that is the concatenation of the children's, and hands
//! each child its own generator seeded from the parent's.

use nux::Scalar;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, trace};

use crate::error::{FlowError, Result};
use crate::flow::{
    batch_dim, check_params, child_rng, lift, split_batch, Direction, Flow, FlowOutput,
};

/// Layers applied one after another; inverse runs them in reverse order.
pub struct Sequential<T: Scalar> {
    layers: Vec<Box<dyn Flow<T>>>,
}

impl<T: Scalar> Default for Sequential<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Sequential<T> {
    pub fn new() -> Self {
        Sequential { layers: Vec::new() }
    }

    /// Append a layer.
    pub fn push(mut self, layer: impl Flow<T> + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Start offset of every layer's parameters, plus the total at the end.
    fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.layers.len() + 1);
        let mut acc = 0;
        offsets.push(acc);
        for layer in &self.layers {
            acc += layer.num_params();
            offsets.push(acc);
        }
        offsets
    }
}

impl<T: Scalar> Flow<T> for Sequential<T> {
    fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.num_params()).sum()
    }

    /// Initializes each layer on the batch as transformed by the layers
    /// before it.
    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        batch_dim(batch)?;
        let mut params = Vec::with_capacity(self.num_params());
        let mut current = batch.to_vec();

        for (i, layer) in self.layers.iter().enumerate() {
            let mut child = StdRng::seed_from_u64(rng.next_u64());
            let layer_params = layer.init(&current, &mut child)?;
            check_params(&layer_params, layer.num_params())?;
            debug!(layer = i, params = layer_params.len(), "initialized layer");

            let lifted = lift::<T>(&layer_params);
            let mut next = Vec::with_capacity(current.len());
            for row in &current {
                let out = layer.apply(&lifted, &lift::<T>(row), None, Direction::Forward)?;
                next.push(out.x.iter().map(Scalar::value).collect());
            }
            current = next;
            params.extend(layer_params);
        }
        Ok(params)
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        mut rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        check_params(params, self.num_params())?;
        let offsets = self.offsets();
        let order: Vec<usize> = match direction {
            Direction::Forward => (0..self.layers.len()).collect(),
            Direction::Inverse => (0..self.layers.len()).rev().collect(),
        };

        let mut out = FlowOutput::new(x.to_vec());
        for i in order {
            let mut child = child_rng(&mut rng);
            let step = self.layers[i].apply(
                &params[offsets[i]..offsets[i + 1]],
                &out.x,
                child.as_mut().map(|c| c as &mut dyn RngCore),
                direction,
            )?;
            trace!(layer = i, log_det = %step.log_det, "applied layer");
            out = FlowOutput {
                x: step.x,
                log_det: out.log_det + step.log_det,
                log_pz: out.log_pz + step.log_pz,
            };
        }
        Ok(out)
    }
}

/// Two flows on the two parts of `x`, split at `len / ratio`.
pub struct Factored<T: Scalar> {
    first: Box<dyn Flow<T>>,
    second: Box<dyn Flow<T>>,
    ratio: usize,
}

impl<T: Scalar> Factored<T> {
    /// Split at the midpoint.
    pub fn new(first: impl Flow<T> + 'static, second: impl Flow<T> + 'static) -> Self {
        Factored {
            first: Box::new(first),
            second: Box::new(second),
            ratio: 2,
        }
    }

    /// Split at `len / ratio`.
    pub fn with_ratio(
        first: impl Flow<T> + 'static,
        second: impl Flow<T> + 'static,
        ratio: usize,
    ) -> Result<Self> {
        if ratio == 0 {
            return Err(FlowError::InvalidConfig("factor ratio must be positive".into()));
        }
        Ok(Factored {
            first: Box::new(first),
            second: Box::new(second),
            ratio,
        })
    }

    fn split_index(&self, len: usize) -> usize {
        len / self.ratio
    }
}

impl<T: Scalar> Flow<T> for Factored<T> {
    fn num_params(&self) -> usize {
        self.first.num_params() + self.second.num_params()
    }

    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        let dim = batch_dim(batch)?;
        let (a, b) = split_batch(batch, self.split_index(dim));
        let mut params = self.first.init(&a, rng)?;
        params.extend(self.second.init(&b, rng)?);
        Ok(params)
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        mut rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        check_params(params, self.num_params())?;
        let (pa, pb) = params.split_at(self.first.num_params());
        let (xa, xb) = x.split_at(self.split_index(x.len()));

        let mut child = child_rng(&mut rng);
        let a = self
            .first
            .apply(pa, xa, child.as_mut().map(|c| c as &mut dyn RngCore), direction)?;
        let mut child = child_rng(&mut rng);
        let b = self
            .second
            .apply(pb, xb, child.as_mut().map(|c| c as &mut dyn RngCore), direction)?;

        Ok(FlowOutput {
            x: a.x.into_iter().chain(b.x).collect(),
            log_det: a.log_det + b.log_det,
            log_pz: a.log_pz + b.log_pz,
        })
    }
}

/// Leaves the first half of `x` unchanged and runs a flow on the second half.
pub struct MultiScale<T: Scalar> {
    flow: Box<dyn Flow<T>>,
}

impl<T: Scalar> MultiScale<T> {
    pub fn new(flow: impl Flow<T> + 'static) -> Self {
        MultiScale {
            flow: Box::new(flow),
        }
    }
}

impl<T: Scalar> Flow<T> for MultiScale<T> {
    fn num_params(&self) -> usize {
        self.flow.num_params()
    }

    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        let dim = batch_dim(batch)?;
        let (_, b) = split_batch(batch, dim / 2);
        self.flow.init(&b, rng)
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        let (xa, xb) = x.split_at(x.len() / 2);
        let out = self.flow.apply(params, xb, rng, direction)?;
        Ok(FlowOutput {
            x: xa.iter().copied().chain(out.x).collect(),
            ..out
        })
    }
}

/// Runs a flow in the opposite direction.
///
/// The wrapped flow already reports the log-determinant of whichever map it
/// applied, so the output is passed through unchanged.
pub struct ReverseFlow<T: Scalar> {
    flow: Box<dyn Flow<T>>,
}

impl<T: Scalar> ReverseFlow<T> {
    pub fn new(flow: impl Flow<T> + 'static) -> Self {
        ReverseFlow {
            flow: Box::new(flow),
        }
    }
}

impl<T: Scalar> Flow<T> for ReverseFlow<T> {
    fn num_params(&self) -> usize {
        self.flow.num_params()
    }

    /// Delegates to the wrapped flow, which sees the batch as its own input.
    fn init(&self, batch: &[Vec<T::Float>], rng: &mut dyn RngCore) -> Result<Vec<T::Float>> {
        self.flow.init(batch, rng)
    }

    fn apply(
        &self,
        params: &[T],
        x: &[T],
        rng: Option<&mut dyn RngCore>,
        direction: Direction,
    ) -> Result<FlowOutput<T>> {
        self.flow.apply(params, x, rng, direction.reversed())
    }
}
