//! MobileNetV1 Search Space
//!
//! Tokens select channel widths, kernel sizes and the depth of the fourth
//! downsampling stage of a MobileNetV1-style network. The token layout is
//! described once, by `STAGES`; the range table, the token length and the
//! decoder all walk that plan, so they cannot disagree.

use tracing::debug;

use super::layers::{
    depthwise_separable, ArchHead, BottleneckParam, ConvBnSpec, FcSpec, LayerSpec,
    NetArch,
};
use super::search_space::{validate_tokens, SearchSpace, SearchSpaceBase};
use crate::error::{KolosalError, Result};

/// Stem convolution output channels
pub const HEAD_NUM: [usize; 7] = [3, 4, 8, 12, 16, 24, 32];
pub const FILTER_NUM1: [usize; 8] = [3, 4, 8, 12, 16, 24, 32, 48];
pub const FILTER_NUM2: [usize; 8] = [8, 12, 16, 24, 32, 48, 64, 80];
pub const FILTER_NUM3: [usize; 10] = [16, 24, 32, 48, 64, 80, 96, 128, 144, 160];
pub const FILTER_NUM4: [usize; 10] = [24, 32, 48, 64, 80, 96, 128, 144, 160, 192];
pub const FILTER_NUM5: [usize; 12] = [32, 48, 64, 80, 96, 128, 144, 160, 192, 224, 256, 320];
pub const FILTER_NUM6: [usize; 11] = [64, 80, 96, 128, 144, 160, 192, 224, 256, 320, 384];
pub const FILTER_NUM7: [usize; 14] = [
    64, 80, 96, 128, 144, 160, 192, 224, 256, 320, 384, 512, 1024, 1048,
];
pub const FILTER_NUM8: [usize; 13] = [
    128, 144, 160, 192, 224, 256, 320, 384, 512, 576, 640, 704, 768,
];
pub const FILTER_NUM9: [usize; 12] = [
    160, 192, 224, 256, 320, 384, 512, 640, 768, 832, 1024, 1048,
];
/// Depthwise kernel sizes
pub const K_SIZE: [usize; 2] = [3, 5];
/// Repeat counts of the fourth downsampling stage
pub const REPEAT: [usize; 6] = [1, 2, 3, 4, 5, 6];

/// Hand-tuned baseline (standard MobileNetV1 widths, depth 5 in stage 4)
const BASE_INIT_TOKENS: [usize; 29] = [
    6, // 32
    6, 6, 0, // 32, 64, 3
    6, 7, 0, // 64, 128, 3
    7, 6, 0, // 128, 128, 3
    6, 10, 0, // 128, 256, 3
    10, 8, 0, // 256, 256, 3
    8, 11, 0, // 256, 512, 3
    4, // depth 5
    11, 8, 0, // 512, 512, 3
    8, 10, 0, // 512, 1024, 3
    10, 10, 0, // 1024, 1024, 3
];

const STEM_NAME: &str = "mobilenetv1";
const FC_WEIGHT_NAME: &str = "mobilenetv2_fc_weights";
const FC_BIAS_NAME: &str = "mobilenetv2_fc_offset";

/// One bottleneck entry: reads three tokens (in width, out width, kernel)
#[derive(Debug, Clone, Copy)]
struct EntryPlan {
    input: &'static [usize],
    output: &'static [usize],
    stride: usize,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// A single entry
    Once(EntryPlan),
    /// A repeat-count token followed by an entry emitted that many times
    Repeated(EntryPlan),
}

impl Step {
    fn token_width(&self) -> usize {
        match self {
            Step::Once(_) => 3,
            Step::Repeated(_) => 4,
        }
    }

    fn bounds(&self, out: &mut Vec<usize>) {
        let plan = match self {
            Step::Once(plan) => plan,
            Step::Repeated(plan) => {
                out.push(REPEAT.len());
                plan
            }
        };
        out.extend([plan.input.len(), plan.output.len(), K_SIZE.len()]);
    }
}

/// A downsampling stage, active once `block_num >= min_block`
#[derive(Debug)]
struct StagePlan {
    min_block: usize,
    steps: &'static [Step],
}

const fn entry(input: &'static [usize], output: &'static [usize], stride: usize) -> EntryPlan {
    EntryPlan { input, output, stride }
}

static STAGES: [StagePlan; 5] = [
    StagePlan {
        min_block: 1,
        steps: &[Step::Once(entry(&FILTER_NUM1, &FILTER_NUM2, 1))],
    },
    StagePlan {
        min_block: 2,
        steps: &[
            Step::Once(entry(&FILTER_NUM2, &FILTER_NUM3, 2)),
            Step::Once(entry(&FILTER_NUM3, &FILTER_NUM4, 1)),
        ],
    },
    StagePlan {
        min_block: 3,
        steps: &[
            Step::Once(entry(&FILTER_NUM4, &FILTER_NUM5, 2)),
            Step::Once(entry(&FILTER_NUM5, &FILTER_NUM6, 1)),
        ],
    },
    StagePlan {
        min_block: 4,
        steps: &[
            Step::Once(entry(&FILTER_NUM6, &FILTER_NUM7, 2)),
            Step::Repeated(entry(&FILTER_NUM7, &FILTER_NUM8, 1)),
        ],
    },
    StagePlan {
        min_block: 5,
        steps: &[
            Step::Once(entry(&FILTER_NUM8, &FILTER_NUM9, 2)),
            Step::Once(entry(&FILTER_NUM9, &FILTER_NUM9, 1)),
        ],
    },
];

/// Reads tokens in slot order, resolving each against its table
struct TokenCursor<'a> {
    tokens: &'a [usize],
    position: usize,
}

impl<'a> TokenCursor<'a> {
    fn new(tokens: &'a [usize]) -> Self {
        Self { tokens, position: 0 }
    }

    fn take(&mut self, table: &[usize]) -> Result<usize> {
        let position = self.position;
        let value = *self.tokens.get(position).ok_or_else(|| KolosalError::ShapeError {
            expected: format!("at least {} tokens", position + 1),
            actual: format!("{} tokens", self.tokens.len()),
        })?;
        self.position += 1;

        table.get(value).copied().ok_or(KolosalError::TokenOutOfRange {
            position,
            value,
            bound: table.len(),
        })
    }

    fn take_entry(&mut self, plan: &EntryPlan) -> Result<BottleneckParam> {
        Ok(BottleneckParam {
            in_channels: self.take(plan.input)?,
            out_channels: self.take(plan.output)?,
            stride: plan.stride,
            kernel_size: self.take(&K_SIZE)?,
        })
    }
}

/// MobileNetV1 search space
#[derive(Debug, Clone)]
pub struct MobileNetV1Space {
    base: SearchSpaceBase,
    /// Width multiplier for depthwise-separable block channels
    scale: f64,
    /// Classifier width when `output_size == 1`
    class_dim: usize,
}

impl MobileNetV1Space {
    /// Registry key
    pub const NAME: &'static str = "MobileNetV1Space";

    /// Create a search space with `scale = 1.0` and `class_dim = 1000`
    pub fn new(input_size: usize, output_size: usize, block_num: usize) -> Result<Self> {
        if block_num >= 6 {
            return Err(KolosalError::invalid_parameter(
                "block_num",
                block_num,
                "MobileNetV1: block number must be less than 6",
            ));
        }

        Ok(Self {
            base: SearchSpaceBase::new(input_size, output_size, block_num)?,
            scale: 1.0,
            class_dim: 1000,
        })
    }

    /// Set the width multiplier
    pub fn with_scale(mut self, scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(KolosalError::invalid_parameter(
                "scale",
                scale,
                "must be a positive finite number",
            ));
        }
        self.scale = scale;
        Ok(self)
    }

    /// Set the classifier width
    pub fn with_class_dim(mut self, class_dim: usize) -> Result<Self> {
        if class_dim == 0 {
            return Err(KolosalError::invalid_parameter("class_dim", class_dim, "must be positive"));
        }
        self.class_dim = class_dim;
        Ok(self)
    }

    pub fn block_num(&self) -> usize {
        self.base.block_num
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn class_dim(&self) -> usize {
        self.class_dim
    }

    fn active_stages(&self) -> impl Iterator<Item = &'static StagePlan> + '_ {
        STAGES.iter().filter(move |stage| self.base.block_num >= stage.min_block)
    }

    /// Number of token positions used at this block count
    pub fn token_len(&self) -> usize {
        1 + self
            .active_stages()
            .flat_map(|stage| stage.steps.iter())
            .map(Step::token_width)
            .sum::<usize>()
    }

    /// Decode tokens into the bottleneck list, without building layers
    pub fn bottleneck_params(&self, tokens: &[usize]) -> Result<Vec<BottleneckParam>> {
        self.decode(tokens).map(|(_, params)| params)
    }

    fn decode(&self, tokens: &[usize]) -> Result<(usize, Vec<BottleneckParam>)> {
        validate_tokens(tokens, &self.range_table())?;

        let mut cursor = TokenCursor::new(tokens);
        let head_channels = cursor.take(&HEAD_NUM)?;
        let mut params = Vec::new();

        for stage in self.active_stages() {
            for step in stage.steps {
                match step {
                    Step::Once(plan) => params.push(cursor.take_entry(plan)?),
                    Step::Repeated(plan) => {
                        let repeat = cursor.take(&REPEAT)?;
                        let param = cursor.take_entry(plan)?;
                        params.extend(std::iter::repeat(param).take(repeat));
                    }
                }
            }
        }

        Ok((head_channels, params))
    }

    fn assemble(&self, head_channels: usize, bottlenecks: Vec<BottleneckParam>) -> NetArch {
        let mut layers = Vec::with_capacity(1 + 2 * bottlenecks.len());
        layers.push(LayerSpec::ConvBn(ConvBnSpec::new(3, head_channels, 2, STEM_NAME)));

        for (i, param) in bottlenecks.iter().enumerate() {
            let name = format!("{}_{}", STEM_NAME, i + 1);
            layers.extend(depthwise_separable(
                param.in_channels,
                param.out_channels,
                param.in_channels,
                param.stride,
                self.scale,
                param.kernel_size,
                &name,
            ));
        }

        let head = if self.base.output_size == 1 {
            ArchHead::Classifier(FcSpec {
                size: self.class_dim,
                weight_name: FC_WEIGHT_NAME.to_string(),
                bias_name: FC_BIAS_NAME.to_string(),
            })
        } else {
            ArchHead::FeatureMap {
                output_size: self.base.output_size,
                input_size: self.base.input_size,
                block_num: self.base.block_num,
            }
        };

        NetArch {
            head_channels,
            bottlenecks,
            scale: self.scale,
            layers,
            head,
        }
    }
}

impl SearchSpace for MobileNetV1Space {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base(&self) -> &SearchSpaceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SearchSpaceBase {
        &mut self.base
    }

    fn init_tokens(&self) -> Vec<usize> {
        BASE_INIT_TOKENS[..self.token_len()].to_vec()
    }

    fn range_table(&self) -> Vec<usize> {
        let mut table = vec![HEAD_NUM.len()];
        for step in self.active_stages().flat_map(|stage| stage.steps.iter()) {
            step.bounds(&mut table);
        }
        table
    }

    fn token2arch(&self, tokens: Option<&[usize]>) -> Result<NetArch> {
        let owned;
        let tokens = match tokens {
            Some(tokens) => tokens,
            None => {
                owned = self.tokens();
                owned.as_slice()
            }
        };

        let (head_channels, bottlenecks) = self.decode(tokens)?;
        debug!(
            block_num = self.base.block_num,
            token_len = tokens.len(),
            bottlenecks = bottlenecks.len(),
            "decoded MobileNetV1 tokens"
        );

        Ok(self.assemble(head_channels, bottlenecks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lengths() {
        let lengths = [
            HEAD_NUM.len(),
            FILTER_NUM1.len(),
            FILTER_NUM2.len(),
            FILTER_NUM3.len(),
            FILTER_NUM4.len(),
            FILTER_NUM5.len(),
            FILTER_NUM6.len(),
            FILTER_NUM7.len(),
            FILTER_NUM8.len(),
            FILTER_NUM9.len(),
        ];
        assert_eq!(lengths, [7, 8, 8, 10, 10, 12, 11, 14, 13, 12]);
    }

    #[test]
    fn test_token_len_per_block_num() {
        let lens: Vec<usize> = (1..=5)
            .map(|b| MobileNetV1Space::new(224, 7, b).unwrap().token_len())
            .collect();
        assert_eq!(lens, vec![4, 10, 16, 23, 29]);
    }

    #[test]
    fn test_full_range_table() {
        let space = MobileNetV1Space::new(224, 7, 5).unwrap();
        assert_eq!(
            space.range_table(),
            vec![
                7, 8, 8, 2, 8, 10, 2, 10, 10, 2, 10, 12, 2, 12, 11, 2, 11, 14, 2, 6, 14, 13, 2,
                13, 12, 2, 12, 12, 2,
            ]
        );
    }

    #[test]
    fn test_block_num_six_rejected() {
        assert!(MobileNetV1Space::new(224, 7, 5).is_ok());
        let err = MobileNetV1Space::new(224, 3, 6).unwrap_err();
        assert!(err.to_string().contains("less than 6"));
    }

    #[test]
    fn test_single_block_defaults() {
        let space = MobileNetV1Space::new(32, 16, 1).unwrap();
        assert_eq!(space.init_tokens(), vec![6, 6, 6, 0]);

        let arch = space.token2arch(None).unwrap();
        assert_eq!(arch.head_channels, 32);
        assert_eq!(
            arch.bottlenecks,
            vec![BottleneckParam { in_channels: 32, out_channels: 64, stride: 1, kernel_size: 3 }]
        );
    }

    #[test]
    fn test_repeat_slot() {
        let space = MobileNetV1Space::new(224, 14, 4).unwrap();
        let mut tokens = space.init_tokens();
        tokens[19] = 3;

        let params = space.bottleneck_params(&tokens).unwrap();
        let repeated: Vec<_> = params
            .iter()
            .filter(|p| p.stride == 1 && p.in_channels == FILTER_NUM7[tokens[20]])
            .collect();
        assert_eq!(repeated.len(), REPEAT[3]);
        assert_eq!(params.len(), 1 + 2 + 2 + 1 + 4);
    }

    #[test]
    fn test_out_of_range_token_propagates() {
        let space = MobileNetV1Space::new(224, 7, 5).unwrap();
        let mut tokens = space.init_tokens();
        tokens[3] = K_SIZE.len();

        match space.token2arch(Some(&tokens)) {
            Err(KolosalError::TokenOutOfRange { position, value, bound }) => {
                assert_eq!((position, value, bound), (3, 2, 2));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        let space = MobileNetV1Space::new(224, 28, 3).unwrap();
        let tokens = vec![0; space.token_len() - 1];
        assert!(matches!(
            space.token2arch(Some(&tokens)),
            Err(KolosalError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_layer_names_increase() {
        let space = MobileNetV1Space::new(224, 7, 5).unwrap();
        let arch = space.token2arch(None).unwrap();
        let names: Vec<&str> = arch.layers.iter().map(LayerSpec::name).collect();

        assert_eq!(names[0], "mobilenetv1");
        assert_eq!(names[1], "mobilenetv1_1_dw");
        assert_eq!(names[2], "mobilenetv1_1_sep");
        let last = arch.num_bottlenecks();
        assert_eq!(*names.last().unwrap(), format!("mobilenetv1_{}_sep", last));
    }

    #[test]
    fn test_stem_is_not_width_scaled() {
        let space = MobileNetV1Space::new(224, 7, 5).unwrap().with_scale(0.75).unwrap();
        let tokens = space.init_tokens();
        let arch = space.token2arch(Some(&tokens)).unwrap();

        match &arch.layers[0] {
            LayerSpec::ConvBn(stem) => {
                assert_eq!(stem.num_filters, HEAD_NUM[tokens[0]]);
                assert_eq!(stem.filter_size, 3);
                assert_eq!(stem.stride, 2);
            }
            other => panic!("expected stem conv, got {:?}", other),
        }
        match &arch.layers[1] {
            LayerSpec::ConvBn(dw) => assert_eq!(dw.num_filters, 24),
            other => panic!("expected depthwise conv, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_scale() {
        let space = MobileNetV1Space::new(224, 7, 5).unwrap();
        assert!(space.clone().with_scale(0.0).is_err());
        assert!(space.clone().with_scale(f64::NAN).is_err());
        assert!(space.with_scale(0.75).is_ok());
    }
}
