pub mod net;

use std::path::Path;

use image::RgbImage;
use image::imageops::FilterType;
use tch::nn::{self, ModuleT};
use tch::vision::imagenet;
use tch::{Device, Kind, Tensor};

use crate::error::AnalyzeError;
use crate::explain::{self, CamCaptures, Heatmap};

/// Fixed input resolution expected by the network.
pub const INPUT_SIZE: u32 = 224;

/// Top-1 classification outcome.
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub class_index: i64,
}

/// The pretrained classifier, loaded once at startup and shared read-only for
/// the lifetime of the process.
pub struct Classifier {
    vs: nn::VarStore,
    features: nn::SequentialT,
    classifier: nn::SequentialT,
}

impl Classifier {
    /// Deserialize the network weights from `path`. Missing or mismatched
    /// weights are a startup failure; the caller aborts rather than serve.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, tch::TchError> {
        let device = Device::cuda_if_available();
        let mut vs = nn::VarStore::new(device);
        let root = vs.root();
        let features = net::features(&(&root / "features"));
        let classifier = net::classifier(&(&root / "classifier"), imagenet::CLASS_COUNT);
        drop(root);
        vs.load(path)?;
        vs.freeze();
        Ok(Self {
            vs,
            features,
            classifier,
        })
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Forward pass over the full network, returning the argmax label and its
    /// softmax probability.
    pub fn predict(&self, input: &Tensor) -> Result<Prediction, AnalyzeError> {
        let input = input.to_device(self.device());
        let logits = tch::no_grad(|| {
            let fmap = self.features.forward_t(&input, false);
            self.classifier.forward_t(&fmap, false)
        });
        let probs = logits.f_softmax(-1, Kind::Float)?;
        let class_index = probs.f_argmax(-1, false)?.f_int64_value(&[0])?;
        let confidence = probs.f_double_value(&[0, class_index])? as f32;
        let label = imagenet::CLASSES[class_index as usize].to_string();
        Ok(Prediction {
            label,
            confidence,
            class_index,
        })
    }

    /// Second forward pass for attribution: capture the feature map, detach it
    /// into a gradient leaf, run the head on it, and backpropagate the target
    /// class logit to obtain the gradient of the score with respect to the
    /// feature map.
    pub fn grad_cam(&self, input: &Tensor, class_index: i64) -> Result<Heatmap, AnalyzeError> {
        let input = input.to_device(self.device());
        let fmap = self
            .features
            .forward_t(&input, false)
            .detach()
            .set_requires_grad(true);
        let logits = self.classifier.forward_t(&fmap, false);
        let score = logits.f_select(1, class_index)?.f_sum(Kind::Float)?;
        score.backward();
        let captures = CamCaptures {
            gradients: fmap.grad(),
            activations: fmap.detach(),
        };
        explain::grad_cam(&captures)
    }
}

/// Decode arbitrary image bytes, coerce to 3-channel color, and resize to the
/// network's input resolution.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, AnalyzeError> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(decoded
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8())
}

/// Pack an RGB image into a `[1, 3, H, W]` float tensor scaled to [-1, 1],
/// the distribution the network was trained on.
pub fn to_input_tensor(image: &RgbImage) -> Tensor {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut chw = vec![0f32; 3 * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            chw[c * plane + offset] = pixel[c] as f32 / 127.5 - 1.0;
        }
    }
    Tensor::from_slice(&chw).view([1, 3, height as i64, width as i64])
}
