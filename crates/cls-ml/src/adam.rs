//! Adam optimizers: dense (per tensor) and lazy (per touched embedding row).

use cls_types::ToolkitError;
use ndarray::{Array, Array1, Array2, Dimension};
use std::collections::HashMap;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-7;

#[derive(Debug)]
pub(crate) struct Adam {
    learning_rate: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
}

impl Adam {
    pub(crate) fn new(len: usize, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
        }
    }

    pub(crate) fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<(), ToolkitError> {
        if grad.len() != params.len() || params.len() != self.v.len() {
            return Err(ToolkitError::Training(format!(
                "optimizer size mismatch: {} grads for {} params",
                grad.len(),
                params.len()
            )));
        }

        self.beta1_t *= BETA1;
        self.beta2_t *= BETA2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = self.learning_rate * (bc2.sqrt() / bc1);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = BETA1 * *v + (1. - BETA1) * g;
                *s = BETA2 * *s + (1. - BETA2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + EPSILON);
            });

        Ok(())
    }

    /// Update an ndarray tensor in place; both arrays must be in standard layout.
    pub(crate) fn update_tensor<D: Dimension>(
        &mut self,
        grad: &Array<f32, D>,
        params: &mut Array<f32, D>,
    ) -> Result<(), ToolkitError> {
        let grad = grad
            .as_slice()
            .ok_or_else(|| ToolkitError::Training("gradient is not contiguous".to_string()))?;
        let params = params
            .as_slice_mut()
            .ok_or_else(|| ToolkitError::Training("parameters are not contiguous".to_string()))?;
        self.update_params(grad, params)
    }
}

/// Adam over an embedding table that only touches the rows present in a batch.
#[derive(Debug)]
pub(crate) struct RowAdam {
    learning_rate: f32,
    step: i32,
    v: Array2<f32>,
    s: Array2<f32>,
}

impl RowAdam {
    pub(crate) fn new(rows: usize, dim: usize, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            step: 0,
            v: Array2::zeros((rows, dim)),
            s: Array2::zeros((rows, dim)),
        }
    }

    pub(crate) fn update_rows(
        &mut self,
        grads: &HashMap<u32, Array1<f32>>,
        table: &mut Array2<f32>,
    ) -> Result<(), ToolkitError> {
        if table.dim() != self.v.dim() {
            return Err(ToolkitError::Training("embedding optimizer shape mismatch".to_string()));
        }
        self.step += 1;
        let bc1 = 1. - BETA1.powi(self.step);
        let bc2 = 1. - BETA2.powi(self.step);
        let step_size = self.learning_rate * (bc2.sqrt() / bc1);

        for (&row, grad) in grads {
            let row = row as usize;
            if row >= table.nrows() {
                continue;
            }
            let mut p = table.row_mut(row);
            let mut v = self.v.row_mut(row);
            let mut s = self.s.row_mut(row);
            for k in 0..grad.len() {
                let g = grad[k];
                v[k] = BETA1 * v[k] + (1. - BETA1) * g;
                s[k] = BETA2 * s[k] + (1. - BETA2) * g * g;
                p[k] -= step_size * v[k] / (s[k].sqrt() + EPSILON);
            }
        }
        Ok(())
    }
}
