//! Text recognition with a CTC line recognizer.

use image::DynamicImage;
use ndarray::{ArrayD, ArrayView2, Axis};
use tracing::trace;

use crate::error::OcrError;
use crate::models::Alphabet;
use subocr_inference::{ExecutionContext, InferenceBackend, InputTensor};

use super::preprocessing::ImagePreprocessor;

/// Text recognizer over a single-line crop.
pub struct TextRecognizer<B: InferenceBackend> {
    backend: B,
    preprocessor: ImagePreprocessor,
    alphabet: Alphabet,
}

/// Recognition result for a single text region.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Recognized text.
    pub text: String,
    /// Mean of the per-character confidences, 0 for empty text.
    pub confidence: f32,
    /// Per-character confidences.
    pub char_scores: Vec<f32>,
}

impl<B: InferenceBackend> TextRecognizer<B> {
    pub fn new(backend: B, alphabet: Alphabet) -> Self {
        Self {
            backend,
            preprocessor: ImagePreprocessor::new(),
            alphabet,
        }
    }

    /// Set the recognizer input height and optional fixed width.
    pub fn with_input_size(mut self, height: u32, width: Option<u32>) -> Self {
        self.preprocessor = self.preprocessor.with_recognition_size(height, width);
        self
    }

    /// Recognize text in a cropped image.
    pub fn recognize(
        &self,
        ctx: &ExecutionContext,
        image: &DynamicImage,
    ) -> Result<RecognitionResult, OcrError> {
        let tensor = self.preprocessor.preprocess_for_recognition(image)?;
        let input_name = self
            .backend
            .input_names()
            .first()
            .map(String::as_str)
            .unwrap_or("x");

        let outputs = self
            .backend
            .run(ctx, &[(input_name, InputTensor::Float32(tensor.into_dyn()))])?;
        let (_, output) = outputs
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::Recognition("no output from model".to_string()))?;

        let result = ctc_decode(&output.into_f32()?, &self.alphabet)?;
        trace!("Recognized '{}' ({:.3})", result.text, result.confidence);
        Ok(result)
    }
}

/// Greedy CTC decoding of recognizer logits.
///
/// Accepts `[1, T, C]` or `[T, 1, C]` where `C` must equal the alphabet's
/// class count. Each step takes the arg-max class; repeats collapse and the
/// blank (class 0) is dropped. Character confidence is the softmax
/// probability of the chosen class.
pub fn ctc_decode(output: &ArrayD<f32>, alphabet: &Alphabet) -> Result<RecognitionResult, OcrError> {
    let steps: ArrayView2<f32> = match output.shape() {
        [1, _, _] => output
            .index_axis(Axis(0), 0)
            .into_dimensionality()
            .map_err(|e| OcrError::Recognition(e.to_string()))?,
        [_, 1, _] => output
            .index_axis(Axis(1), 0)
            .into_dimensionality()
            .map_err(|e| OcrError::Recognition(e.to_string()))?,
        shape => {
            return Err(OcrError::Recognition(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
    };

    let num_classes = steps.ncols();
    if num_classes != alphabet.num_classes() {
        return Err(OcrError::Recognition(format!(
            "model has {} classes but the alphabet has {}",
            num_classes,
            alphabet.num_classes()
        )));
    }

    let mut text = String::new();
    let mut char_scores = Vec::new();
    let mut prev_class = 0usize;

    for row in steps.rows() {
        let (class, max) = row
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 { (i, v) } else { best }
            });
        let sum_exp: f32 = row.iter().map(|v| (v - max).exp()).sum();

        if class != 0 && class != prev_class {
            if let Some(c) = alphabet.get(class) {
                text.push(c);
                char_scores.push(1.0 / sum_exp);
            }
        }
        prev_class = class;
    }

    let confidence = if char_scores.is_empty() {
        0.0
    } else {
        char_scores.iter().sum::<f32>() / char_scores.len() as f32
    };

    Ok(RecognitionResult {
        text,
        confidence,
        char_scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, IxDyn};
    use pretty_assertions::assert_eq;

    /// One-hot-ish logits: the chosen class gets a large value.
    fn logits(classes: &[usize], num_classes: usize) -> Array3<f32> {
        let mut out = Array3::<f32>::zeros((1, classes.len(), num_classes));
        for (t, &c) in classes.iter().enumerate() {
            out[[0, t, c]] = 20.0;
        }
        out
    }

    #[test]
    fn test_decode_collapses_repeats_and_blanks() {
        let alphabet = Alphabet::new("abc");
        // a a _ a b _ _ c c space
        let out = logits(&[1, 1, 0, 1, 2, 0, 0, 3, 3, 4], alphabet.num_classes());
        let result = ctc_decode(&out.into_dyn(), &alphabet).unwrap();

        assert_eq!(result.text, "aabc ");
        assert_eq!(result.char_scores.len(), 5);
        assert!(result.confidence > 0.99);
    }

    #[test]
    fn test_decode_time_major() {
        let alphabet = Alphabet::new("ab");
        let batch_major = logits(&[2, 0, 1], alphabet.num_classes());
        let time_major = batch_major.clone().permuted_axes([1, 0, 2]);

        let a = ctc_decode(&batch_major.into_dyn(), &alphabet).unwrap();
        let b = ctc_decode(&time_major.into_dyn(), &alphabet).unwrap();
        assert_eq!(a.text, "ba");
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_all_blank() {
        let alphabet = Alphabet::new("ab");
        let result = ctc_decode(&logits(&[0, 0, 0], 4).into_dyn(), &alphabet).unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_decode_softmax_confidence() {
        let alphabet = Alphabet::new("a");
        // Classes 1 and 2 tie; the first one wins.
        let mut out = Array3::<f32>::zeros((1, 1, 3));
        out[[0, 0, 1]] = 1.0;
        out[[0, 0, 2]] = 1.0;
        let result = ctc_decode(&out.into_dyn(), &alphabet).unwrap();
        assert_eq!(result.text, "a");
        let expected = 1.0 / (1.0 + 1.0 + (-1.0f32).exp());
        assert!((result.confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_class_mismatch() {
        let alphabet = Alphabet::new("abc");
        let err = ctc_decode(&logits(&[1], 3).into_dyn(), &alphabet);
        assert!(matches!(err, Err(OcrError::Recognition(_))));
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let alphabet = Alphabet::new("a");
        let out = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 3]));
        assert!(ctc_decode(&out, &alphabet).is_err());
        let out = ArrayD::<f32>::zeros(IxDyn(&[3, 3]));
        assert!(ctc_decode(&out, &alphabet).is_err());
    }
}
