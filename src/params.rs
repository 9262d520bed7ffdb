//! Parameter store shared by the network assemblers and the external optimizer.
//!
//! Parameters are held per affine layer rather than in a string-keyed map. A [`ParamKey`]
//! addresses one tensor by `(layer, role)` and formats as the familiar `W1`, `b1`,
//! `gamma1`, `beta1` names.

use crate::error::{NetError, Result};
use crate::tensor::Element;
use crate::utils::rng::normal_matrix;
use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD};
use rand::rngs::StdRng;
use std::fmt;
use std::str::FromStr;

/// What a parameter tensor does within its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Weight,
    Bias,
    /// Batch normalization gamma
    Scale,
    /// Batch normalization beta
    Shift,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Role::Weight => "W",
            Role::Bias => "b",
            Role::Scale => "gamma",
            Role::Shift => "beta",
        }
    }
}

/// Address of one parameter tensor. `layer` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey {
    pub layer: usize,
    pub role: Role,
}

impl ParamKey {
    pub fn new(layer: usize, role: Role) -> Self {
        Self { layer, role }
    }

    pub fn weight(layer: usize) -> Self {
        Self::new(layer, Role::Weight)
    }

    pub fn bias(layer: usize) -> Self {
        Self::new(layer, Role::Bias)
    }

    pub fn scale(layer: usize) -> Self {
        Self::new(layer, Role::Scale)
    }

    pub fn shift(layer: usize) -> Self {
        Self::new(layer, Role::Shift)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role.prefix(), self.layer)
    }
}

impl FromStr for ParamKey {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        // "beta" must be tried before "b"
        let roles = [Role::Scale, Role::Shift, Role::Weight, Role::Bias];
        for role in roles {
            if let Some(rest) = s.strip_prefix(role.prefix()) {
                return match rest.parse::<usize>() {
                    Ok(layer) if layer > 0 => Ok(Self::new(layer, role)),
                    _ => Err(NetError::UnknownKey(s.to_string())),
                };
            }
        }
        Err(NetError::UnknownKey(s.to_string()))
    }
}

/// Batch normalization scale and shift for one hidden layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NormParams<T> {
    pub(crate) gamma: Array1<T>,
    pub(crate) beta: Array1<T>,
}

impl<T> NormParams<T> {
    pub fn new(gamma: Array1<T>, beta: Array1<T>) -> Self {
        Self { gamma, beta }
    }

    pub fn gamma(&self) -> &Array1<T> {
        &self.gamma
    }

    pub fn beta(&self) -> &Array1<T> {
        &self.beta
    }
}

/// Learnable tensors of one affine layer, plus the batch normalization that follows it.
///
/// Fields are read-only outside the crate. Shapes are checked when the layer enters a
/// [`ParamSet`] and cannot change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams<T> {
    /// `(fan_in, fan_out)`
    pub(crate) weight: Array2<T>,
    pub(crate) bias: Array1<T>,
    pub(crate) norm: Option<NormParams<T>>,
}

impl<T: Element> LayerParams<T> {
    pub fn new(weight: Array2<T>, bias: Array1<T>, norm: Option<NormParams<T>>) -> Self {
        Self { weight, bias, norm }
    }

    pub fn weight(&self) -> &Array2<T> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<T> {
        &self.bias
    }

    pub fn norm(&self) -> Option<&NormParams<T>> {
        self.norm.as_ref()
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn zeros_like(&self) -> Self {
        Self {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
            norm: self.norm.as_ref().map(|n| NormParams {
                gamma: Array1::zeros(n.gamma.raw_dim()),
                beta: Array1::zeros(n.beta.raw_dim()),
            }),
        }
    }

    fn tensors(&self, layer: usize) -> Vec<(ParamKey, ArrayViewD<'_, T>)> {
        let mut out = vec![
            (ParamKey::weight(layer), self.weight.view().into_dyn()),
            (ParamKey::bias(layer), self.bias.view().into_dyn()),
        ];
        if let Some(norm) = &self.norm {
            out.push((ParamKey::scale(layer), norm.gamma.view().into_dyn()));
            out.push((ParamKey::shift(layer), norm.beta.view().into_dyn()));
        }
        out
    }

    fn tensors_mut(&mut self, layer: usize) -> Vec<(ParamKey, ArrayViewMutD<'_, T>)> {
        let mut out = vec![
            (ParamKey::weight(layer), self.weight.view_mut().into_dyn()),
            (ParamKey::bias(layer), self.bias.view_mut().into_dyn()),
        ];
        if let Some(norm) = &mut self.norm {
            out.push((ParamKey::scale(layer), norm.gamma.view_mut().into_dyn()));
            out.push((ParamKey::shift(layer), norm.beta.view_mut().into_dyn()));
        }
        out
    }
}

/// All learnable tensors of a network, ordered by layer.
///
/// Created once at construction and never resized. A network hands its store to the
/// optimizer as [`ParamsMut`], which only allows in-place writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet<T> {
    layers: Vec<LayerParams<T>>,
}

/// Gradients share the store's layout, so keys and shapes always line up.
pub type Gradients<T> = ParamSet<T>;

impl<T: Element> ParamSet<T> {
    /// Draws weights from N(0, weight_scale²) with zero biases.
    ///
    /// `layer_dims` lists the output width of every affine layer, the last being the number
    /// of classes. With `use_batchnorm`, every layer but the last also gets `gamma = 1` and
    /// `beta = 0` sized to its width.
    pub fn initialize(
        input_dim: usize,
        layer_dims: &[usize],
        weight_scale: f64,
        use_batchnorm: bool,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(layer_dims.len());
        let mut fan_in = input_dim;
        for (i, &fan_out) in layer_dims.iter().enumerate() {
            let is_last = i + 1 == layer_dims.len();
            let norm = (use_batchnorm && !is_last).then(|| NormParams {
                gamma: Array1::ones(fan_out),
                beta: Array1::zeros(fan_out),
            });
            layers.push(LayerParams {
                weight: normal_matrix(rng, (fan_in, fan_out), weight_scale)?,
                bias: Array1::zeros(fan_out),
                norm,
            });
            fan_in = fan_out;
        }
        Self::from_layers(input_dim, layers)
    }

    /// Wraps explicit layer parameters after checking that their shapes chain.
    pub fn from_layers(input_dim: usize, layers: Vec<LayerParams<T>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(NetError::config("a network needs at least one affine layer"));
        }
        let mut fan_in = input_dim;
        for (i, layer) in layers.iter().enumerate() {
            let l = i + 1;
            if layer.input_dim() != fan_in {
                return Err(NetError::config(format!(
                    "W{} has {} rows but the previous layer outputs {}",
                    l,
                    layer.input_dim(),
                    fan_in
                )));
            }
            if layer.output_dim() == 0 {
                return Err(NetError::config(format!("W{} has no output columns", l)));
            }
            if layer.bias.len() != layer.output_dim() {
                return Err(NetError::config(format!(
                    "b{} has length {} but W{} has {} columns",
                    l,
                    layer.bias.len(),
                    l,
                    layer.output_dim()
                )));
            }
            if let Some(norm) = &layer.norm {
                if norm.gamma.len() != layer.output_dim() || norm.beta.len() != layer.output_dim()
                {
                    return Err(NetError::config(format!(
                        "gamma{}/beta{} must have length {}",
                        l,
                        l,
                        layer.output_dim()
                    )));
                }
            }
            fan_in = layer.output_dim();
        }
        Ok(Self { layers })
    }

    /// Same layout with every entry zero.
    pub fn zeros_like(&self) -> Self {
        Self {
            layers: self.layers.iter().map(LayerParams::zeros_like).collect(),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, LayerParams::input_dim)
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map_or(0, LayerParams::output_dim)
    }

    /// Layer `layer` (1-based).
    pub fn layer(&self, layer: usize) -> Option<&LayerParams<T>> {
        layer.checked_sub(1).and_then(|i| self.layers.get(i))
    }

    fn layer_mut(&mut self, layer: usize) -> Option<&mut LayerParams<T>> {
        layer.checked_sub(1).and_then(move |i| self.layers.get_mut(i))
    }

    pub fn layers(&self) -> &[LayerParams<T>] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [LayerParams<T>] {
        &mut self.layers
    }

    pub fn get(&self, key: ParamKey) -> Option<ArrayViewD<'_, T>> {
        let layer = self.layer(key.layer)?;
        match key.role {
            Role::Weight => Some(layer.weight.view().into_dyn()),
            Role::Bias => Some(layer.bias.view().into_dyn()),
            Role::Scale => layer.norm.as_ref().map(|n| n.gamma.view().into_dyn()),
            Role::Shift => layer.norm.as_ref().map(|n| n.beta.view().into_dyn()),
        }
    }

    pub fn get_mut(&mut self, key: ParamKey) -> Option<ArrayViewMutD<'_, T>> {
        let layer = self.layer_mut(key.layer)?;
        match key.role {
            Role::Weight => Some(layer.weight.view_mut().into_dyn()),
            Role::Bias => Some(layer.bias.view_mut().into_dyn()),
            Role::Scale => layer.norm.as_mut().map(|n| n.gamma.view_mut().into_dyn()),
            Role::Shift => layer.norm.as_mut().map(|n| n.beta.view_mut().into_dyn()),
        }
    }

    /// Looks up a tensor by its textual name, e.g. `"W2"` or `"gamma1"`.
    pub fn by_name(&self, name: &str) -> Result<ArrayViewD<'_, T>> {
        let key: ParamKey = name.parse()?;
        self.get(key).ok_or(NetError::MissingParameter(key))
    }

    pub fn contains(&self, key: ParamKey) -> bool {
        self.get(key).is_some()
    }

    /// Keys in layer order: `W`, `b`, then `gamma`, `beta` when present.
    pub fn keys(&self) -> Vec<ParamKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, ArrayViewD<'_, T>)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| layer.tensors(i + 1))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParamKey, ArrayViewMutD<'_, T>)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| layer.tensors_mut(i + 1))
    }

    /// Total number of scalars across all tensors.
    pub fn parameter_count(&self) -> usize {
        self.iter().map(|(_, t)| t.len()).sum()
    }

    /// Sum of squares over every weight matrix. Biases and batch norm terms are excluded.
    pub fn weight_square_sum(&self) -> T {
        self.layers.iter().fold(T::zero(), |acc, layer| {
            acc + layer.weight.fold(T::zero(), |s, &w| s + w * w)
        })
    }
}

/// In-place write access to a network's [`ParamSet`].
///
/// Entries can be overwritten through array views, but no tensor can be replaced or resized,
/// so the layout fixed at construction always holds. Reads go through `Deref`.
///
/// ```compile_fail
/// use fc_nets::{Classifier, TwoLayerNet};
///
/// let mut net = TwoLayerNet::<f64>::new(4, 10, 3, 1e-2, 0.0, Some(0)).unwrap();
/// let resized = net.params().zeros_like();
/// let mut params = net.params_mut();
/// *params = resized;
/// ```
#[derive(Debug)]
pub struct ParamsMut<'a, T> {
    params: &'a mut ParamSet<T>,
}

impl<'a, T: Element> ParamsMut<'a, T> {
    pub(crate) fn new(params: &'a mut ParamSet<T>) -> Self {
        Self { params }
    }

    pub fn get_mut(&mut self, key: ParamKey) -> Option<ArrayViewMutD<'_, T>> {
        self.params.get_mut(key)
    }

    /// Mutable view of a tensor by its textual name.
    pub fn by_name_mut(&mut self, name: &str) -> Result<ArrayViewMutD<'_, T>> {
        let key: ParamKey = name.parse()?;
        self.params
            .get_mut(key)
            .ok_or(NetError::MissingParameter(key))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParamKey, ArrayViewMutD<'_, T>)> {
        self.params.iter_mut()
    }
}

impl<T> std::ops::Deref for ParamsMut<'_, T> {
    type Target = ParamSet<T>;

    fn deref(&self) -> &ParamSet<T> {
        self.params
    }
}

/// Per-feature running mean and variance of one batch normalization layer.
///
/// Updated only by training-mode forward passes; read verbatim in test mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats<T> {
    pub mean: Array1<T>,
    pub var: Array1<T>,
}

impl<T: Element> RunningStats<T> {
    pub fn new(size: usize) -> Self {
        Self {
            mean: Array1::zeros(size),
            var: Array1::zeros(size),
        }
    }

    /// Folds one minibatch's statistics into the running averages:
    /// `running = momentum * running + (1 - momentum) * batch`.
    pub fn update(&mut self, batch_mean: &Array1<T>, batch_var: &Array1<T>, momentum: T) {
        let keep = momentum;
        let take = T::one() - momentum;
        self.mean
            .zip_mut_with(batch_mean, |r, &b| *r = keep * *r + take * b);
        self.var
            .zip_mut_with(batch_var, |r, &b| *r = keep * *r + take * b);
    }
}
