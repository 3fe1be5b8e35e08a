//! CNN Model Architecture for Plant Disease Classification
//!
//! Convolutional network in Burn that maps a normalized 256x256 RGB leaf
//! photo to one raw logit per PlantVillage class. Only the forward pass is
//! used here; weights come from a CompactRecorder checkpoint.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::DiagnosisError;

/// Configuration for the PlantClassifier CNN model
#[derive(Config, Debug)]
pub struct PlantClassifierConfig {
    /// Number of output classes (default: 38 for PlantVillage)
    #[config(default = "38")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "256")]
    pub input_size: usize,

    /// Dropout rate; inactive at inference but part of the record layout
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "32")]
    pub base_filters: usize,
}

impl PlantClassifierConfig {
    /// Expected [channels, height, width] of one input image
    pub fn input_dims(&self) -> [usize; 3] {
        [self.in_channels, self.input_size, self.input_size]
    }
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.bn.forward(self.conv.forward(x)));

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Plant Disease Classifier CNN
///
/// Architecture:
/// - 4 convolutional blocks, each halving the spatial size
/// - Global Average Pooling
/// - Two-layer classifier head producing raw logits
#[derive(Module, Debug)]
pub struct PlantClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> PlantClassifier<B> {
    /// Create a freshly initialized classifier
    pub fn new(config: &PlantClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        // 3 -> base -> 2*base -> 4*base -> 8*base, 256 -> 16 spatially
        let conv1 = ConvBlock::new(config.in_channels, base, 3, true, device);
        let conv2 = ConvBlock::new(base, base * 2, 3, true, device);
        let conv3 = ConvBlock::new(base * 2, base * 4, 3, true, device);
        let conv4 = ConvBlock::new(base * 4, base * 8, 3, true, device);

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let fc1 = LinearConfig::new(base * 8, 256).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(256, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Build the architecture and load trained weights from a CompactRecorder file.
    ///
    /// The recorder sets the `.mpk` extension itself, so `path` may carry it or not.
    pub fn load(
        config: &PlantClassifierConfig,
        path: &Path,
        device: &B::Device,
    ) -> crate::utils::error::Result<Self> {
        let with_ext = path.with_extension("mpk");
        if !path.exists() && !with_ext.exists() {
            return Err(DiagnosisError::ModelLoad {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        Self::new(config, device)
            .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
            .map_err(|e| DiagnosisError::ModelLoad {
                path: path.to_path_buf(),
                reason: format!("{:?}", e),
            })
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(all(test, any(feature = "ndarray", feature = "cpu")))]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_plant_classifier_output_shape() {
        let device = Default::default();
        let config = PlantClassifierConfig::new().with_base_filters(4);
        let model = PlantClassifier::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let dims = model.forward(input).dims();

        assert_eq!(dims[0], 2);
        assert_eq!(dims[1], 38);
        assert_eq!(model.num_classes(), 38);
    }

    #[test]
    fn test_input_dims() {
        let config = PlantClassifierConfig::new();
        assert_eq!(config.input_dims(), [3, 256, 256]);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let device = Default::default();
        let config = PlantClassifierConfig::new();
        let result = PlantClassifier::<TestBackend>::load(
            &config,
            Path::new("/nonexistent/plant_classifier"),
            &device,
        );
        assert!(matches!(result, Err(DiagnosisError::ModelLoad { .. })));
    }

    #[test]
    fn test_checkpoint_reload_gives_same_logits() {
        let device = Default::default();
        let config = PlantClassifierConfig::new()
            .with_num_classes(5)
            .with_base_filters(4);
        let model = PlantClassifier::<TestBackend>::new(&config, &device);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant_classifier");
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .unwrap();

        let loaded = PlantClassifier::<TestBackend>::load(&config, &path, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = loaded.forward(input).into_data().to_vec::<f32>().unwrap();

        assert_eq!(actual.len(), 5);
        assert_eq!(actual, expected);
    }
}
