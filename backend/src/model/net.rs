//! MobileNetV2 built with `tch::nn`, split into the convolutional `features`
//! stack and the pooled `classifier` head so the feature map between them can
//! be captured for attribution.

use tch::Tensor;
use tch::nn::{self, ConvConfig, ModuleT, SequentialT};

/// Channel width of the final convolutional feature map.
pub const FEATURE_CHANNELS: i64 = 1280;

// (expansion, output channels, repeats, first stride)
const BLOCK_SETTINGS: [(i64, i64, i64, i64); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

fn conv2d(p: &nn::Path, c_in: i64, c_out: i64, ksize: i64, stride: i64, groups: i64) -> nn::Conv2D {
    let cfg = ConvConfig {
        stride,
        padding: (ksize - 1) / 2,
        groups,
        bias: false,
        ..Default::default()
    };
    nn::conv2d(p, c_in, c_out, ksize, cfg)
}

fn conv_bn_relu6(
    p: &nn::Path,
    c_in: i64,
    c_out: i64,
    ksize: i64,
    stride: i64,
    groups: i64,
) -> SequentialT {
    nn::seq_t()
        .add(conv2d(&(p / "conv"), c_in, c_out, ksize, stride, groups))
        .add(nn::batch_norm2d(p / "bn", c_out, Default::default()))
        .add_fn(|xs| xs.clamp(0.0, 6.0))
}

#[derive(Debug)]
struct InvertedResidual {
    conv: SequentialT,
    use_res_connect: bool,
}

impl ModuleT for InvertedResidual {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = self.conv.forward_t(xs, train);
        if self.use_res_connect { xs + ys } else { ys }
    }
}

fn inverted_residual(
    p: &nn::Path,
    c_in: i64,
    c_out: i64,
    stride: i64,
    expand: i64,
) -> InvertedResidual {
    let hidden = c_in * expand;
    let mut conv = nn::seq_t();
    if expand != 1 {
        conv = conv.add(conv_bn_relu6(&(p / "expand"), c_in, hidden, 1, 1, 1));
    }
    let conv = conv
        .add(conv_bn_relu6(&(p / "depthwise"), hidden, hidden, 3, stride, hidden))
        .add(conv2d(&(p / "project"), hidden, c_out, 1, 1, 1))
        .add(nn::batch_norm2d(p / "project_bn", c_out, Default::default()));
    InvertedResidual {
        conv,
        use_res_connect: stride == 1 && c_in == c_out,
    }
}

/// The convolutional stack: stem, seventeen inverted-residual blocks, and the
/// 1x1 head. Maps `[N, 3, 224, 224]` to `[N, 1280, 7, 7]`.
pub fn features(p: &nn::Path) -> SequentialT {
    let mut seq = nn::seq_t().add(conv_bn_relu6(&(p / "stem"), 3, 32, 3, 2, 1));
    let mut c_in = 32;
    let mut index = 0;
    for (expand, c_out, repeats, first_stride) in BLOCK_SETTINGS {
        for i in 0..repeats {
            let stride = if i == 0 { first_stride } else { 1 };
            let q = p / format!("block{}", index);
            seq = seq.add(inverted_residual(&q, c_in, c_out, stride, expand));
            c_in = c_out;
            index += 1;
        }
    }
    seq.add(conv_bn_relu6(&(p / "head"), c_in, FEATURE_CHANNELS, 1, 1, 1))
}

/// Global average pooling plus the linear prediction layer, consuming the
/// feature map produced by [`features`].
pub fn classifier(p: &nn::Path, nclasses: i64) -> SequentialT {
    nn::seq_t()
        .add_fn(|xs| xs.adaptive_avg_pool2d([1, 1]).flat_view())
        .add_fn_t(|xs, train| xs.dropout(0.2, train))
        .add(nn::linear(
            p / "linear",
            FEATURE_CHANNELS,
            nclasses,
            Default::default(),
        ))
}
