use crate::config::InputLayout;
use crate::error::AppError;
use crate::models::classify_types::{ModelMetadata, Prediction};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

// Teachable Machine maps 0..=255 onto roughly -1..1 with x / 127 - 1.
const PIXEL_SCALE: f32 = 127.0;

const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

/// Anything that turns a preprocessed image batch into raw class scores.
pub trait ImageModel: Send {
    fn predict(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError>;
}

impl ImageModel for Session {
    fn predict(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError> {
        let input_name = self
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| AppError::Inference("Model has no inputs".to_string()))?;

        let input_tensor = Value::from_array(input)
            .map_err(|e| AppError::Inference(format!("Failed to create tensor value: {}", e)))?;

        let outputs = self
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| AppError::Inference(format!("Inference failed: {}", e)))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| AppError::Inference("Model produced no outputs".to_string()))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

/// Draws the image onto a square `image_size` surface the way Teachable
/// Machine does: centre crop to the short edge, bilinear resize, then scale
/// every channel into [-1, 1].
pub fn preprocess_image(
    img: &DynamicImage,
    image_size: u32,
    layout: InputLayout,
) -> Result<Array4<f32>, AppError> {
    if image_size == 0 {
        return Err(AppError::Inference("Model image size must be non-zero".to_string()));
    }

    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return Err(AppError::Decode("Image has no pixels".to_string()));
    }

    let side = w.min(h);
    let cropped = img.crop_imm((w - side) / 2, (h - side) / 2, side, side);
    let resized = cropped.resize_exact(image_size, image_size, FilterType::Triangle);
    let raw = resized.to_rgb8().into_raw();

    let size = image_size as usize;
    let hw = size * size;

    let (shape, data) = match layout {
        InputLayout::Nhwc => (
            (1, size, size, 3),
            raw.iter().map(|&v| v as f32 / PIXEL_SCALE - 1.0).collect::<Vec<f32>>(),
        ),
        InputLayout::Nchw => {
            let mut data = vec![0f32; 3 * hw];
            for (i, pixel) in raw.chunks_exact(3).enumerate() {
                data[i] = pixel[0] as f32 / PIXEL_SCALE - 1.0;
                data[hw + i] = pixel[1] as f32 / PIXEL_SCALE - 1.0;
                data[2 * hw + i] = pixel[2] as f32 / PIXEL_SCALE - 1.0;
            }
            ((1, 3, size, size), data)
        }
    };

    Array4::from_shape_vec(shape, data)
        .map_err(|e| AppError::Inference(format!("Failed to create tensor: {}", e)))
}

/// Softmax unless the scores already form a probability distribution.
pub fn normalize_scores(raw: &[f32]) -> Vec<f32> {
    let in_range = raw.iter().all(|&x| (0.0..=1.0).contains(&x));
    let sum: f32 = raw.iter().sum();
    if raw.is_empty() || (in_range && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE) {
        return raw.to_vec();
    }

    let max_logit = raw.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = raw.iter().map(|&x| (x - max_logit).exp()).sum();
    raw.iter().map(|&x| (x - max_logit).exp() / exp_sum).collect()
}

/// Per-class probabilities in model order (not sorted).
pub fn classify_with_model(
    model: &mut dyn ImageModel,
    img: &DynamicImage,
    metadata: &ModelMetadata,
    layout: InputLayout,
) -> Result<Vec<Prediction>, AppError> {
    let tensor = preprocess_image(img, metadata.image_size, layout)?;
    let scores = normalize_scores(&model.predict(tensor)?);

    Ok(scores
        .into_iter()
        .enumerate()
        .map(|(idx, probability)| Prediction {
            class_name: metadata
                .labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx)),
            probability,
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Returns canned score vectors in order, one per call.
    pub struct ScriptedModel {
        outputs: VecDeque<Vec<f32>>,
        pub shapes: Vec<Vec<usize>>,
    }

    impl ScriptedModel {
        pub fn new(outputs: Vec<Vec<f32>>) -> Self {
            Self {
                outputs: outputs.into(),
                shapes: Vec::new(),
            }
        }
    }

    impl ImageModel for ScriptedModel {
        fn predict(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError> {
            self.shapes.push(input.shape().to_vec());
            self.outputs
                .pop_front()
                .ok_or_else(|| AppError::Inference("no scripted output left".to_string()))
        }
    }

    pub fn metadata() -> ModelMetadata {
        ModelMetadata {
            labels: vec!["not full".to_string(), "full".to_string()],
            image_size: 8,
            model_name: Some("tm-my-image-model".to_string()),
            tm_version: None,
            package_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{metadata, ScriptedModel};
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn nhwc_tensor_has_batch_of_one() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([255, 255, 255])));
        let tensor = preprocess_image(&img, 16, InputLayout::Nhwc).unwrap();
        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);

        let expected = 255.0 / PIXEL_SCALE - 1.0;
        assert!(tensor.iter().all(|&v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn nchw_tensor_splits_channels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 127, 254])));
        let tensor = preprocess_image(&img, 4, InputLayout::Nchw).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);

        assert!((tensor[[0, 0, 2, 2]] + 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 2, 2]].abs() < 1e-6);
        assert!((tensor[[0, 2, 2, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn wide_image_is_cropped_to_centre() {
        // Black bands on the left and right, red square in the middle.
        let mut img = RgbImage::from_pixel(30, 10, Rgb([0, 0, 0]));
        for x in 10..20 {
            for y in 0..10 {
                img.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        let tensor = preprocess_image(&DynamicImage::ImageRgb8(img), 5, InputLayout::Nhwc).unwrap();

        let red = 255.0 / PIXEL_SCALE - 1.0;
        for y in 0..5 {
            for x in 0..5 {
                assert!((tensor[[0, y, x, 0]] - red).abs() < 1e-6);
                assert!((tensor[[0, y, x, 1]] + 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn empty_image_is_rejected() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = preprocess_image(&img, 8, InputLayout::Nhwc).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn probabilities_pass_through() {
        assert_eq!(normalize_scores(&[0.25, 0.75]), vec![0.25, 0.75]);
    }

    #[test]
    fn logits_are_softmaxed() {
        let scores = normalize_scores(&[2.0, -1.0]);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn predictions_keep_model_order_and_labels() {
        let mut model = ScriptedModel::new(vec![vec![0.2, 0.8]]);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 12, Rgb([10, 20, 30])));

        let preds = classify_with_model(&mut model, &img, &metadata(), InputLayout::Nhwc).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].class_name, "not full");
        assert_eq!(preds[1].class_name, "full");
        assert!((preds[1].probability - 0.8).abs() < 1e-6);
        assert_eq!(model.shapes, vec![vec![1, 8, 8, 3]]);
    }

    #[test]
    fn unlabeled_outputs_get_index_names() {
        let mut model = ScriptedModel::new(vec![vec![0.1, 0.1, 0.8]]);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));

        let preds = classify_with_model(&mut model, &img, &metadata(), InputLayout::Nhwc).unwrap();
        assert_eq!(preds[2].class_name, "class_2");
    }
}
