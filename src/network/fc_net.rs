use super::{check_finite, regularize, Classifier};
use crate::config::NetworkConfig;
use crate::error::{NetError, Result};
use crate::layers::{
    softmax_loss, Affine, AffineCache, BatchNorm, BatchNormCache, Dropout, DropoutCache, Layer,
    Relu, ReluCache,
};
use crate::params::{Gradients, ParamKey, ParamSet, ParamsMut, RunningStats};
use crate::tensor::{Element, Labels, Minibatch};
use crate::utils::rng::seeded_rng;
use ndarray::Array2;
use rand::rngs::StdRng;

/// One step of the forward pipeline. Indices are 0-based affine layer positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Affine(usize),
    BatchNorm(usize),
    Relu,
    Dropout,
}

/// Cache of one stage from the current training call.
enum StageCache<'p, T> {
    Affine(usize, AffineCache<'p, T>),
    BatchNorm(usize, BatchNormCache<'p, T>),
    Relu(ReluCache<T>),
    Dropout(DropoutCache<T>),
}

/// Fully-connected classifier with an arbitrary number of hidden layers.
///
/// For L affine layers the pipeline is
///
/// ```text
/// {affine - [batch norm] - relu - [dropout]} x (L - 1) - affine - softmax
/// ```
///
/// The stage plan is fixed at construction. Batch normalization running statistics live
/// alongside the parameters and are updated by training passes only.
#[derive(Debug, Clone)]
pub struct FullyConnectedNet<T: Element> {
    params: ParamSet<T>,
    running: Vec<RunningStats<T>>,
    plan: Vec<Stage>,
    reg: T,
    epsilon: T,
    momentum: T,
    dropout: f64,
    seed: Option<u64>,
    rng: StdRng,
}

impl<T: Element> FullyConnectedNet<T> {
    /// Builds a network with freshly initialized parameters.
    ///
    /// Fails with a `Configuration` error if any option is invalid or if `config.precision`
    /// differs from `T`. Configs default to `Precision::Float32`, so an `f64` network needs
    /// `NetworkConfig::new(..).with_precision(Precision::Float64)` or `"precision": "float64"`
    /// in its JSON file.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Self::check_config(config)?;
        let mut rng = seeded_rng(config.seed);
        let params = ParamSet::initialize(
            config.input_dim,
            &config.layer_dims(),
            config.weight_scale,
            config.use_batchnorm,
            &mut rng,
        )?;
        Ok(Self::assemble(config, params, rng))
    }

    /// Builds a network around existing parameters, e.g. ones restored by an optimizer.
    ///
    /// The parameter layout must match what [`FullyConnectedNet::new`] would create for the
    /// same config.
    pub fn from_params(config: &NetworkConfig, params: ParamSet<T>) -> Result<Self> {
        Self::check_config(config)?;
        if params.input_dim() != config.input_dim {
            return Err(NetError::config(format!(
                "parameters take {} input features but input_dim is {}",
                params.input_dim(),
                config.input_dim
            )));
        }
        let dims = config.layer_dims();
        let actual: Vec<usize> = params.layers().iter().map(|l| l.output_dim()).collect();
        if actual != dims {
            return Err(NetError::config(format!(
                "parameter layer widths {:?} do not match {:?}",
                actual, dims
            )));
        }
        let last = dims.len() - 1;
        for (i, layer) in params.layers().iter().enumerate() {
            let wants_norm = config.use_batchnorm && i < last;
            if layer.norm.is_some() != wants_norm {
                let key = ParamKey::scale(i + 1);
                return Err(if wants_norm {
                    NetError::MissingParameter(key)
                } else {
                    NetError::config(format!("unexpected batch normalization parameter {}", key))
                });
            }
        }
        let rng = seeded_rng(config.seed);
        Ok(Self::assemble(config, params, rng))
    }

    fn check_config(config: &NetworkConfig) -> Result<()> {
        config.validate()?;
        if config.precision != T::PRECISION {
            return Err(NetError::config(format!(
                "config precision is {:?} but the network is built with {:?}",
                config.precision,
                T::PRECISION
            )));
        }
        Ok(())
    }

    fn assemble(config: &NetworkConfig, params: ParamSet<T>, rng: StdRng) -> Self {
        let hidden = config.hidden_dims.len();
        let running = if config.use_batchnorm {
            config.hidden_dims.iter().map(|&h| RunningStats::new(h)).collect()
        } else {
            Vec::new()
        };

        let mut plan = Vec::with_capacity(4 * hidden + 1);
        for i in 0..hidden {
            plan.push(Stage::Affine(i));
            if config.use_batchnorm {
                plan.push(Stage::BatchNorm(i));
            }
            plan.push(Stage::Relu);
            if config.use_dropout() {
                plan.push(Stage::Dropout);
            }
        }
        plan.push(Stage::Affine(hidden));

        log::debug!(
            "fully-connected net {} -> {:?} -> {}: {} layers, batchnorm={}, dropout={}, {} parameters",
            config.input_dim,
            config.hidden_dims,
            config.num_classes,
            config.num_layers(),
            config.use_batchnorm,
            config.dropout,
            params.parameter_count()
        );

        Self {
            params,
            running,
            plan,
            reg: T::cast(config.reg),
            epsilon: T::cast(config.batchnorm_epsilon),
            momentum: T::cast(config.batchnorm_momentum),
            dropout: config.dropout,
            seed: config.seed,
            rng,
        }
    }

    /// Number of affine layers.
    pub fn num_layers(&self) -> usize {
        self.params.num_layers()
    }

    pub fn reg(&self) -> T {
        self.reg
    }

    pub fn set_reg(&mut self, reg: T) {
        self.reg = reg;
    }

    pub fn use_batchnorm(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn use_dropout(&self) -> bool {
        self.dropout > 0.0
    }

    pub fn dropout(&self) -> f64 {
        self.dropout
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Running statistics of every batch normalization layer, in layer order.
    pub fn running_stats(&self) -> &[RunningStats<T>] {
        &self.running
    }
}

fn affine_at<T: Element>(params: &ParamSet<T>, i: usize) -> Result<Affine<'_, T>> {
    let layer = params
        .layers()
        .get(i)
        .ok_or(NetError::MissingParameter(ParamKey::weight(i + 1)))?;
    Ok(Affine::new(layer.weight.view(), layer.bias.view()))
}

fn batchnorm_at<'p, 'r, T: Element>(
    params: &'p ParamSet<T>,
    running: &'r RunningStats<T>,
    i: usize,
    epsilon: T,
) -> Result<BatchNorm<'p, 'r, T>> {
    let norm = params
        .layers()
        .get(i)
        .and_then(|l| l.norm.as_ref())
        .ok_or(NetError::MissingParameter(ParamKey::scale(i + 1)))?;
    Ok(BatchNorm::new(
        norm.gamma.view(),
        norm.beta.view(),
        running,
        epsilon,
    ))
}

impl<T: Element> Classifier<T> for FullyConnectedNet<T> {
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
        let mut out = batch.features().to_owned();
        for stage in &self.plan {
            out = match *stage {
                Stage::Affine(i) => affine_at(&self.params, i)?.predict(out.view()),
                Stage::BatchNorm(i) => {
                    let stats = self
                        .running
                        .get(i)
                        .ok_or(NetError::MissingParameter(ParamKey::scale(i + 1)))?;
                    batchnorm_at(&self.params, stats, i, self.epsilon)?.predict(out.view())
                }
                Stage::Relu => Relu.predict(out.view()),
                // inverted dropout needs no rescaling at test time
                Stage::Dropout => out,
            };
        }
        Ok(out)
    }

    fn loss_and_grads(
        &mut self,
        batch: &Minibatch<'_, T>,
        labels: Labels<'_>,
    ) -> Result<(T, Gradients<T>)> {
        let Self {
            params,
            running,
            plan,
            reg,
            epsilon,
            momentum,
            dropout,
            seed,
            rng,
        } = self;
        let params: &ParamSet<T> = params;

        // A seeded network draws the same dropout masks on every training call
        if let Some(seed) = *seed {
            *rng = seeded_rng(Some(seed));
        }

        let mut caches = Vec::with_capacity(plan.len());
        let mut out = batch.features().to_owned();
        for stage in plan.iter() {
            let (next, cache) = match *stage {
                Stage::Affine(i) => {
                    let (o, c) = affine_at(params, i)?.forward(out.view());
                    (o, StageCache::Affine(i, c))
                }
                Stage::BatchNorm(i) => {
                    let stats = running
                        .get_mut(i)
                        .ok_or(NetError::MissingParameter(ParamKey::scale(i + 1)))?;
                    let (o, c) = batchnorm_at(params, stats, i, *epsilon)?.forward(out.view());
                    stats.update(c.mean(), c.var(), *momentum);
                    (o, StageCache::BatchNorm(i, c))
                }
                Stage::Relu => {
                    let (o, c) = Relu.forward(out.view());
                    (o, StageCache::Relu(c))
                }
                Stage::Dropout => {
                    let (o, c) = Dropout::new(*dropout, &mut *rng)?.forward(out.view());
                    (o, StageCache::Dropout(c))
                }
            };
            out = next;
            caches.push(cache);
        }

        let (data_loss, dscores) = softmax_loss(out.view(), labels.as_slice());

        let mut grads = params.zeros_like();
        let mut dout = dscores;
        for cache in caches.into_iter().rev() {
            dout = match cache {
                StageCache::Affine(i, c) => {
                    let (dx, g) = Affine::backward(c, dout.view());
                    if let Some(slot) = grads.layers_mut().get_mut(i) {
                        slot.weight = g.weight;
                        slot.bias = g.bias;
                    }
                    dx
                }
                StageCache::BatchNorm(i, c) => {
                    let (dx, g) = BatchNorm::backward(c, dout.view());
                    if let Some(norm) = grads.layers_mut().get_mut(i).and_then(|l| l.norm.as_mut())
                    {
                        norm.gamma = g.gamma;
                        norm.beta = g.beta;
                    }
                    dx
                }
                StageCache::Relu(c) => <Relu as Layer<T>>::backward(c, dout.view()).0,
                StageCache::Dropout(c) => <Dropout<'_> as Layer<T>>::backward(c, dout.view()).0,
            };
        }

        let loss = regularize(data_loss, *reg, params, &mut grads);
        check_finite(loss);
        Ok((loss, grads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Precision;
    use ndarray::Array2;

    fn config(hidden: Vec<usize>) -> NetworkConfig {
        NetworkConfig {
            precision: Precision::Float64,
            seed: Some(7),
            ..NetworkConfig::new(4, hidden, 3)
        }
    }

    fn inputs() -> (Array2<f64>, Vec<usize>) {
        let x = Array2::from_shape_fn((5, 4), |(i, j)| ((i * 4 + j) as f64 * 0.37).sin());
        (x, vec![0, 2, 1, 1, 0])
    }

    #[test]
    fn test_plan_without_hidden_layers_is_single_affine() {
        let net = FullyConnectedNet::<f64>::new(&config(vec![])).unwrap();
        assert_eq!(net.plan, vec![Stage::Affine(0)]);
        assert_eq!(net.num_layers(), 1);
    }

    #[test]
    fn test_plan_orders_optional_stages() {
        let cfg = NetworkConfig {
            use_batchnorm: true,
            dropout: 0.5,
            ..config(vec![10, 6])
        };
        let net = FullyConnectedNet::<f64>::new(&cfg).unwrap();
        assert_eq!(
            net.plan,
            vec![
                Stage::Affine(0),
                Stage::BatchNorm(0),
                Stage::Relu,
                Stage::Dropout,
                Stage::Affine(1),
                Stage::BatchNorm(1),
                Stage::Relu,
                Stage::Dropout,
                Stage::Affine(2),
            ]
        );
        assert_eq!(net.running_stats().len(), 2);
        assert!(net.use_batchnorm());
        assert!(net.use_dropout());
    }

    #[test]
    fn test_precision_mismatch_rejected() {
        let cfg = NetworkConfig {
            precision: Precision::Float32,
            ..config(vec![10])
        };
        assert!(matches!(
            FullyConnectedNet::<f64>::new(&cfg),
            Err(NetError::Configuration(_))
        ));
    }

    #[test]
    fn test_training_updates_running_stats_and_scoring_does_not() {
        let cfg = NetworkConfig {
            use_batchnorm: true,
            ..config(vec![10])
        };
        let mut net = FullyConnectedNet::<f64>::new(&cfg).unwrap();
        let (x, y) = inputs();

        net.loss(&x, None).unwrap();
        assert!(net.running_stats()[0].mean.iter().all(|&m| m == 0.0));

        net.loss(&x, Some(&y[..])).unwrap();
        let after_train = net.running_stats()[0].clone();
        assert!(after_train.var.iter().any(|&v| v > 0.0));

        net.loss(&x, None).unwrap();
        assert_eq!(net.running_stats()[0], after_train);
    }

    #[test]
    fn test_seeded_dropout_repeats_masks() {
        let cfg = NetworkConfig {
            dropout: 0.4,
            ..config(vec![10, 8])
        };
        let mut net = FullyConnectedNet::<f64>::new(&cfg).unwrap();
        let (x, y) = inputs();

        let (a, ga) = net.loss(&x, Some(&y[..])).unwrap().into_loss().unwrap();
        let (b, gb) = net.loss(&x, Some(&y[..])).unwrap().into_loss().unwrap();
        assert_eq!(a, b);
        assert_eq!(ga, gb);
    }

    #[test]
    fn test_from_params_checks_layout() {
        let with_bn = FullyConnectedNet::<f64>::new(&NetworkConfig {
            use_batchnorm: true,
            ..config(vec![10])
        })
        .unwrap();
        let params = with_bn.params().clone();

        assert!(matches!(
            FullyConnectedNet::from_params(&config(vec![10]), params.clone()),
            Err(NetError::Configuration(_))
        ));
        assert!(matches!(
            FullyConnectedNet::from_params(&config(vec![12]), params.clone()),
            Err(NetError::Configuration(_))
        ));

        let restored = FullyConnectedNet::from_params(
            &NetworkConfig {
                use_batchnorm: true,
                ..config(vec![10])
            },
            params,
        )
        .unwrap();
        assert_eq!(restored.params(), with_bn.params());
    }

    #[test]
    fn test_gradients_cover_every_parameter() {
        let cfg = NetworkConfig {
            use_batchnorm: true,
            dropout: 0.25,
            reg: 0.1,
            ..config(vec![10, 6])
        };
        let mut net = FullyConnectedNet::<f64>::new(&cfg).unwrap();
        let (x, y) = inputs();
        let (loss, grads) = net.loss(&x, Some(&y[..])).unwrap().into_loss().unwrap();

        assert!(loss.is_finite() && loss > 0.0);
        assert_eq!(grads.keys(), net.params().keys());
        for ((key, g), (_, p)) in grads.iter().zip(net.params().iter()) {
            assert_eq!(g.shape(), p.shape(), "{}", key);
        }
    }
}
