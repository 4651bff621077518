//! Model contract consumed by the training loop

use data_shard::Matrix;
use runtime_core::{Error, Result};

/// A trainable model
///
/// The training loop calls `forward` and then `backward` once per batch and
/// only accumulates the returned loss. Parameter updates happen inside
/// `backward`.
pub trait Model: Send {
    /// Compute the model output for a batch of feature rows
    fn forward(&mut self, batch: &Matrix) -> Result<Matrix>;

    /// Back-propagate one batch and return its loss
    fn backward(&mut self, labels: &Matrix, features: &Matrix) -> Result<f32>;
}

/// One stage of a [`Sequential`] model
pub trait Layer: Send {
    fn name(&self) -> &str;

    fn forward(&mut self, input: &Matrix) -> Result<Matrix>;

    /// Map the gradient of the output to the gradient of the input,
    /// updating the layer's own parameters on the way
    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix>;
}

/// Loss between model output and one-hot labels
pub trait Loss: Send {
    fn loss(&self, predictions: &Matrix, labels: &Matrix) -> Result<f32>;

    /// Gradient of the loss with respect to `predictions`
    fn gradient(&self, predictions: &Matrix, labels: &Matrix) -> Result<Matrix>;
}

/// Ordered stack of layers followed by a loss
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    loss: Box<dyn Loss>,
    /// Input and output of the most recent forward pass, consumed by a
    /// backward pass over the same batch
    last_pass: Option<(Matrix, Matrix)>,
}

impl Sequential {
    pub fn new(loss: Box<dyn Loss>) -> Self {
        Self {
            layers: Vec::new(),
            loss,
            last_pass: None,
        }
    }

    /// Append a layer
    pub fn push(&mut self, layer: Box<dyn Layer>) -> &mut Self {
        self.layers.push(layer);
        self
    }

    pub fn with_layer(mut self, layer: Box<dyn Layer>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }
}

impl Model for Sequential {
    fn forward(&mut self, batch: &Matrix) -> Result<Matrix> {
        let mut output = batch.clone();
        for layer in &mut self.layers {
            output = layer.forward(&output)?;
        }
        self.last_pass = Some((batch.clone(), output.clone()));
        Ok(output)
    }

    fn backward(&mut self, labels: &Matrix, features: &Matrix) -> Result<f32> {
        let predictions = match self.last_pass.take() {
            Some((input, output)) if input == *features => output,
            _ => self.forward(features)?,
        };
        if predictions.rows() != labels.rows() || predictions.cols() != labels.cols() {
            return Err(Error::ShapeMismatch {
                context: "model output against labels".to_string(),
                expected: labels.rows() * labels.cols(),
                actual: predictions.rows() * predictions.cols(),
            });
        }

        let loss = self.loss.loss(&predictions, labels)?;
        let mut grad = self.loss.gradient(&predictions, labels)?;
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        self.last_pass = None;
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Multiplies by a constant and logs calls
    struct Scale {
        name: String,
        factor: f32,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Layer for Scale {
        fn name(&self) -> &str {
            &self.name
        }

        fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
            self.calls.lock().push(format!("{}.forward", self.name));
            let data = input.data().iter().map(|v| v * self.factor).collect();
            Matrix::new(input.rows(), input.cols(), data)
        }

        fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
            self.calls.lock().push(format!("{}.backward", self.name));
            let data = grad_output.data().iter().map(|v| v * self.factor).collect();
            Matrix::new(grad_output.rows(), grad_output.cols(), data)
        }
    }

    struct SumOfSquares;

    impl Loss for SumOfSquares {
        fn loss(&self, predictions: &Matrix, labels: &Matrix) -> Result<f32> {
            Ok(predictions
                .data()
                .iter()
                .zip(labels.data())
                .map(|(p, l)| (p - l) * (p - l))
                .sum())
        }

        fn gradient(&self, predictions: &Matrix, labels: &Matrix) -> Result<Matrix> {
            let data = predictions
                .data()
                .iter()
                .zip(labels.data())
                .map(|(p, l)| 2.0 * (p - l))
                .collect();
            Matrix::new(predictions.rows(), predictions.cols(), data)
        }
    }

    fn model(calls: &Arc<Mutex<Vec<String>>>) -> Sequential {
        let scale = |name: &str, factor| {
            Box::new(Scale {
                name: name.to_string(),
                factor,
                calls: Arc::clone(calls),
            }) as Box<dyn Layer>
        };
        Sequential::new(Box::new(SumOfSquares))
            .with_layer(scale("a", 2.0))
            .with_layer(scale("b", 3.0))
    }

    #[test]
    fn test_forward_then_reverse_backward() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut model = model(&calls);
        assert_eq!(model.layer_names(), vec!["a", "b"]);

        let x = Matrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let y = Matrix::from_rows(vec![vec![6.0, 1.0]]).unwrap();

        let output = model.forward(&x).unwrap();
        assert_eq!(output.data(), &[6.0, 0.0]);

        let loss = model.backward(&y, &x).unwrap();
        assert_eq!(loss, 1.0);
        assert_eq!(
            calls.lock().as_slice(),
            &["a.forward", "b.forward", "b.backward", "a.backward"]
        );
    }

    #[test]
    fn test_backward_without_forward_recomputes() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut model = model(&calls);
        let x = Matrix::from_rows(vec![vec![1.0, 1.0]]).unwrap();
        let y = Matrix::from_rows(vec![vec![6.0, 6.0]]).unwrap();

        assert_eq!(model.backward(&y, &x).unwrap(), 0.0);
        assert_eq!(calls.lock().len(), 4);
    }

    #[test]
    fn test_backward_on_another_batch_recomputes() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut model = model(&calls);
        let seen = Matrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let x = Matrix::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        let y = Matrix::from_rows(vec![vec![0.0, 6.0]]).unwrap();

        model.forward(&seen).unwrap();
        // Same row count as the cached pass, but a different batch
        assert_eq!(model.backward(&y, &x).unwrap(), 0.0);
        assert_eq!(
            calls.lock().as_slice(),
            &["a.forward", "b.forward", "a.forward", "b.forward", "b.backward", "a.backward"]
        );
    }

    #[test]
    fn test_label_shape_checked() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut model = model(&calls);
        let x = Matrix::from_rows(vec![vec![1.0, 1.0]]).unwrap();
        let y = Matrix::from_rows(vec![vec![1.0, 0.0, 0.0]]).unwrap();

        model.forward(&x).unwrap();
        assert!(matches!(
            model.backward(&y, &x),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
