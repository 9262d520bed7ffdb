use super::{check_finite, regularize, Classifier};
use crate::config::NetworkConfig;
use crate::error::{NetError, Result};
use crate::layers::{softmax_loss, Affine, Layer, Relu};
use crate::params::{Gradients, ParamKey, ParamSet, ParamsMut};
use crate::tensor::{Element, Labels, Minibatch};
use crate::utils::rng::seeded_rng;
use ndarray::Array2;

/// Two-layer classifier: affine - relu - affine - softmax.
///
/// Input dimension D, hidden dimension H, C classes. Parameters are `W1 (D, H)`, `b1 (H)`,
/// `W2 (H, C)` and `b2 (C)`.
#[derive(Debug, Clone)]
pub struct TwoLayerNet<T: Element> {
    params: ParamSet<T>,
    reg: T,
}

impl<T: Element> TwoLayerNet<T> {
    /// Weights drawn from N(0, weight_scale²), biases zero.
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        num_classes: usize,
        weight_scale: f64,
        reg: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let config = NetworkConfig {
            weight_scale,
            reg,
            precision: T::PRECISION,
            seed,
            ..NetworkConfig::new(input_dim, vec![hidden_dim], num_classes)
        };
        config.validate()?;

        let mut rng = seeded_rng(seed);
        let params = ParamSet::initialize(
            input_dim,
            &config.layer_dims(),
            weight_scale,
            false,
            &mut rng,
        )?;
        log::debug!(
            "two-layer net {}-{}-{}: {} parameters",
            input_dim,
            hidden_dim,
            num_classes,
            params.parameter_count()
        );
        Ok(Self {
            params,
            reg: T::cast(reg),
        })
    }

    /// Wraps existing parameters. They must form exactly two affine layers without
    /// batch normalization.
    pub fn from_params(params: ParamSet<T>, reg: f64) -> Result<Self> {
        if params.num_layers() != 2 {
            return Err(NetError::config(format!(
                "a two-layer net needs 2 affine layers, got {}",
                params.num_layers()
            )));
        }
        if params.layers().iter().any(|l| l.norm.is_some()) {
            return Err(NetError::config(
                "a two-layer net has no batch normalization parameters",
            ));
        }
        if !(reg.is_finite() && reg >= 0.0) {
            return Err(NetError::config(format!(
                "reg must be non-negative and finite, got {}",
                reg
            )));
        }
        Ok(Self {
            params,
            reg: T::cast(reg),
        })
    }

    pub fn reg(&self) -> T {
        self.reg
    }

    pub fn set_reg(&mut self, reg: T) {
        self.reg = reg;
    }

    fn layers(&self) -> Result<(Affine<'_, T>, Affine<'_, T>)> {
        let l1 = self
            .params
            .layer(1)
            .ok_or(NetError::MissingParameter(ParamKey::weight(1)))?;
        let l2 = self
            .params
            .layer(2)
            .ok_or(NetError::MissingParameter(ParamKey::weight(2)))?;
        Ok((
            Affine::new(l1.weight.view(), l1.bias.view()),
            Affine::new(l2.weight.view(), l2.bias.view()),
        ))
    }
}

impl<T: Element> Classifier<T> for TwoLayerNet<T> {
    fn input_dim(&self) -> usize {
        self.params.input_dim()
    }

    fn num_classes(&self) -> usize {
        self.params.num_classes()
    }

    fn params(&self) -> &ParamSet<T> {
        &self.params
    }

    fn params_mut(&mut self) -> ParamsMut<'_, T> {
        ParamsMut::new(&mut self.params)
    }

    fn scores(&self, batch: &Minibatch<'_, T>) -> Result<Array2<T>> {
        let (hidden, output) = self.layers()?;
        let h = Relu.predict(hidden.predict(batch.features()).view());
        Ok(output.predict(h.view()))
    }

    fn loss_and_grads(
        &mut self,
        batch: &Minibatch<'_, T>,
        labels: Labels<'_>,
    ) -> Result<(T, Gradients<T>)> {
        let (mut hidden, mut output) = self.layers()?;

        let (a1, hidden_cache) = hidden.forward(batch.features());
        let (h1, relu_cache) = Relu.forward(a1.view());
        let (scores, output_cache) = output.forward(h1.view());

        let (data_loss, dscores) = softmax_loss(scores.view(), labels.as_slice());

        let (dh1, output_grads) = Affine::backward(output_cache, dscores.view());
        let (da1, ()) = Relu::backward(relu_cache, dh1.view());
        let (_, hidden_grads) = Affine::backward(hidden_cache, da1.view());

        let mut grads = self.params.zeros_like();
        for (slot, g) in grads
            .layers_mut()
            .iter_mut()
            .zip([hidden_grads, output_grads])
        {
            slot.weight = g.weight;
            slot.bias = g.bias;
        }

        let loss = regularize(data_loss, self.reg, &self.params, &mut grads);
        check_finite(loss);
        Ok((loss, grads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LayerParams;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    fn fixed_net(reg: f64) -> TwoLayerNet<f64> {
        let params = ParamSet::from_layers(
            2,
            vec![
                LayerParams::new(
                    array![[1.0, -1.0, 0.5], [0.5, 2.0, -1.0]],
                    array![0.0, 0.5, 0.0],
                    None,
                ),
                LayerParams::new(
                    array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
                    Array1::zeros(2),
                    None,
                ),
            ],
        )
        .unwrap();
        TwoLayerNet::from_params(params, reg).unwrap()
    }

    #[test]
    fn test_scores_apply_relu_between_layers() {
        let net = fixed_net(0.0);
        let x = array![[1.0, 1.0]];
        let batch = Minibatch::new(&x, 2).unwrap();
        // a1 = [1.5, 1.5, -0.5] -> h1 = [1.5, 1.5, 0.0]
        assert_eq!(net.scores(&batch).unwrap(), array![[1.5, 1.5]]);
    }

    #[test]
    fn test_regularization_adds_half_squared_weights() {
        let x = array![[1.0, 1.0], [0.0, -1.0]];
        let y = [0, 1];

        let (plain, _) = fixed_net(0.0).loss(&x, Some(&y[..])).unwrap().into_loss().unwrap();
        let (reg, grads) = fixed_net(0.1).loss(&x, Some(&y[..])).unwrap().into_loss().unwrap();
        let (_, plain_grads) = fixed_net(0.0).loss(&x, Some(&y[..])).unwrap().into_loss().unwrap();

        // Σ‖W‖² = 7.5 + 4
        assert_relative_eq!(reg - plain, 0.5 * 0.1 * 11.5, epsilon = 1e-12);

        let net = fixed_net(0.0);
        let w1 = net.params().layers()[0].weight();
        let expected = plain_grads.layers()[0].weight() + &(w1 * 0.1);
        assert_eq!(grads.layers()[0].weight(), &expected);
        assert_eq!(grads.layers()[0].bias(), plain_grads.layers()[0].bias());
    }

    #[test]
    fn test_from_params_rejects_three_layers() {
        let mut rng = seeded_rng(Some(0));
        let params = ParamSet::<f32>::initialize(3, &[4, 4, 2], 0.1, false, &mut rng).unwrap();
        assert!(matches!(
            TwoLayerNet::from_params(params, 0.0),
            Err(NetError::Configuration(_))
        ));
    }

    #[test]
    fn test_new_rejects_zero_hidden() {
        assert!(TwoLayerNet::<f64>::new(4, 0, 3, 1e-2, 0.0, None).is_err());
    }
}
