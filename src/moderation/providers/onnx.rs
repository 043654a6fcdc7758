use super::nsfw::{tensor_data, ClassPrediction, NsfwClass, NsfwClassifier};
use ::image::RgbImage;
use ::std::path::Path;
use ::tract_onnx::prelude::*;

/// NSFW classifier exported to ONNX with an NHWC float input and a five way
/// softmax output.
pub struct OnnxClassifier {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl OnnxClassifier {
    pub fn load(path: &Path, input_size: u32) -> ::anyhow::Result<Self> {
        let size = input_size as usize;
        let model = ::tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, f32::fact([1, size, size, 3]).into())?
            .into_optimized()?
            .into_runnable()?;

        Ok(OnnxClassifier { model, input_size })
    }
}

impl NsfwClassifier for OnnxClassifier {
    fn classify(&self, image: &RgbImage) -> ::anyhow::Result<Vec<ClassPrediction>> {
        if image.dimensions() != (self.input_size, self.input_size) {
            return Err(::anyhow::anyhow!(
                "expected a {}x{} image, got {:?}",
                self.input_size,
                self.input_size,
                image.dimensions()
            ));
        }

        let size = self.input_size as usize;
        let input: Tensor =
            tract_ndarray::Array4::from_shape_vec((1, size, size, 3), tensor_data(image))?
                .into();

        let outputs = self.model.run(tvec!(input.into()))?;
        let probabilities: Vec<f32> =
            outputs[0].to_array_view::<f32>()?.iter().copied().collect();

        predictions_from_output(&probabilities)
    }
}

/// Pairs the softmax output with `NsfwClass::ALL`, which is the order of
/// the classifier head.
pub(crate) fn predictions_from_output(
    probabilities: &[f32],
) -> ::anyhow::Result<Vec<ClassPrediction>> {
    if probabilities.len() != NsfwClass::ALL.len() {
        return Err(::anyhow::anyhow!(
            "model produced {} outputs, expected {}",
            probabilities.len(),
            NsfwClass::ALL.len()
        ));
    }

    Ok(NsfwClass::ALL
        .iter()
        .zip(probabilities.iter())
        .map(|(class, probability)| ClassPrediction {
            class: *class,
            probability: f64::from(*probability),
        })
        .collect())
}
