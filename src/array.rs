//! Tagged multi-dimensional value buffers exchanged with a model engine.
//!
//! The engine owns the authoritative state; the adapter moves values across
//! the boundary as [`ModelArray`], a buffer carrying an element-type tag, a
//! shape and the raw data. Validation (type, shape, index range) happens here
//! rather than relying on callers to pass well-formed data.

use crate::errors::{BmiError, BmiResult};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

/// Element type of a model variable.
///
/// Display uses numpy-style names since engine metadata historically reports
/// dtype strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    F64,
    F32,
    I32,
}

impl ElementType {
    /// Width of a single element in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            ElementType::F64 => 8,
            ElementType::F32 => 4,
            ElementType::I32 => 4,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::F64 => write!(f, "float64"),
            ElementType::F32 => write!(f, "float32"),
            ElementType::I32 => write!(f, "int32"),
        }
    }
}

/// A multi-dimensional array of model values with a runtime element-type tag.
///
/// Values keep the engine's canonical ordering (row-major), so flattened
/// indices and coordinate arrays reported by the grid queries line up with
/// the element order here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelArray {
    F64(ArrayD<f64>),
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
}

impl ModelArray {
    /// Build a rank-1 float64 array from a vector of values.
    pub fn from_f64(values: Vec<f64>) -> Self {
        ModelArray::F64(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap())
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ModelArray::F64(_) => ElementType::F64,
            ModelArray::F32(_) => ElementType::F32,
            ModelArray::I32(_) => ElementType::I32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            ModelArray::F64(a) => a.shape(),
            ModelArray::F32(a) => a.shape(),
            ModelArray::I32(a) => a.shape(),
        }
    }

    /// Number of dimensions, 0 for a scalar.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        match self {
            ModelArray::F64(a) => a.len(),
            ModelArray::F32(a) => a.len(),
            ModelArray::I32(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of bytes occupied by the elements.
    pub fn nbytes(&self) -> usize {
        self.len() * self.element_type().byte_width()
    }

    /// Read a single element as `f64`, converting lossily for integer types.
    ///
    /// Used for logging summaries and in tests; value exchange with the
    /// engine always stays in the tagged representation.
    pub fn value_as_f64(&self, index: &[usize]) -> BmiResult<f64> {
        use num::ToPrimitive;

        let out_of_range = || BmiError::IndexOutOfRange {
            index: index.to_vec(),
            shape: self.shape().to_vec(),
        };
        match self {
            ModelArray::F64(a) => a.get(index).copied().ok_or_else(out_of_range),
            ModelArray::F32(a) => a
                .get(index)
                .and_then(|v| v.to_f64())
                .ok_or_else(out_of_range),
            ModelArray::I32(a) => a
                .get(index)
                .and_then(|v| v.to_f64())
                .ok_or_else(out_of_range),
        }
    }

    /// Collect the elements at the given multi-dimensional indices into a
    /// rank-1 array of the same element type, in request order.
    ///
    /// Each index must have exactly `self.rank()` components and lie within
    /// the array shape.
    pub fn gather(&self, indices: &[Vec<usize>]) -> BmiResult<ModelArray> {
        match self {
            ModelArray::F64(a) => gather_inner(a, indices).map(ModelArray::F64),
            ModelArray::F32(a) => gather_inner(a, indices).map(ModelArray::F32),
            ModelArray::I32(a) => gather_inner(a, indices).map(ModelArray::I32),
        }
    }

    /// Overwrite the elements at the given indices with values from a rank-1
    /// array of matching element type and length.
    pub fn scatter(
        &mut self,
        name: &str,
        indices: &[Vec<usize>],
        values: &ModelArray,
    ) -> BmiResult<()> {
        if values.element_type() != self.element_type() {
            return Err(BmiError::TypeMismatch {
                name: name.to_string(),
                expected: self.element_type().to_string(),
                actual: values.element_type().to_string(),
            });
        }
        if values.len() != indices.len() {
            return Err(BmiError::ShapeMismatch {
                name: name.to_string(),
                expected: vec![indices.len()],
                actual: values.shape().to_vec(),
            });
        }
        match (self, values) {
            (ModelArray::F64(a), ModelArray::F64(v)) => scatter_inner(a, indices, v),
            (ModelArray::F32(a), ModelArray::F32(v)) => scatter_inner(a, indices, v),
            (ModelArray::I32(a), ModelArray::I32(v)) => scatter_inner(a, indices, v),
            _ => unreachable!("element types checked above"),
        }
    }

    /// Overwrite a contiguous range of the flattened (row-major) ordering,
    /// starting at `start`, with values from a matching-typed array.
    pub fn write_flat(&mut self, name: &str, start: usize, values: &ModelArray) -> BmiResult<()> {
        if values.element_type() != self.element_type() {
            return Err(BmiError::TypeMismatch {
                name: name.to_string(),
                expected: self.element_type().to_string(),
                actual: values.element_type().to_string(),
            });
        }
        if start + values.len() > self.len() {
            return Err(BmiError::IndexOutOfRange {
                index: vec![start + values.len() - 1],
                shape: vec![self.len()],
            });
        }
        match (self, values) {
            (ModelArray::F64(a), ModelArray::F64(v)) => write_flat_inner(a, start, v),
            (ModelArray::F32(a), ModelArray::F32(v)) => write_flat_inner(a, start, v),
            (ModelArray::I32(a), ModelArray::I32(v)) => write_flat_inner(a, start, v),
            _ => unreachable!("element types checked above"),
        }
        Ok(())
    }

    /// Check that `replacement` matches this array's element type and shape.
    ///
    /// This is the whole-array replacement contract of `set_value`.
    pub fn validate_replacement(&self, name: &str, replacement: &ModelArray) -> BmiResult<()> {
        if replacement.element_type() != self.element_type() {
            return Err(BmiError::TypeMismatch {
                name: name.to_string(),
                expected: self.element_type().to_string(),
                actual: replacement.element_type().to_string(),
            });
        }
        if replacement.shape() != self.shape() {
            return Err(BmiError::ShapeMismatch {
                name: name.to_string(),
                expected: self.shape().to_vec(),
                actual: replacement.shape().to_vec(),
            });
        }
        Ok(())
    }
}

impl From<ArrayD<f64>> for ModelArray {
    fn from(value: ArrayD<f64>) -> Self {
        ModelArray::F64(value)
    }
}

impl From<ArrayD<f32>> for ModelArray {
    fn from(value: ArrayD<f32>) -> Self {
        ModelArray::F32(value)
    }
}

impl From<ArrayD<i32>> for ModelArray {
    fn from(value: ArrayD<i32>) -> Self {
        ModelArray::I32(value)
    }
}

fn gather_inner<T: Clone>(arr: &ArrayD<T>, indices: &[Vec<usize>]) -> BmiResult<ArrayD<T>> {
    let mut out = Vec::with_capacity(indices.len());
    for index in indices {
        out.push(element_at(arr, index)?.clone());
    }
    Ok(ArrayD::from_shape_vec(IxDyn(&[indices.len()]), out).unwrap())
}

fn scatter_inner<T: Clone>(
    arr: &mut ArrayD<T>,
    indices: &[Vec<usize>],
    values: &ArrayD<T>,
) -> BmiResult<()> {
    // Validate every index before mutating so a failed call leaves the
    // array unchanged.
    for index in indices {
        element_at(arr, index)?;
    }
    for (index, value) in indices.iter().zip(values.iter()) {
        arr[index.as_slice()] = value.clone();
    }
    Ok(())
}

fn write_flat_inner<T: Clone>(arr: &mut ArrayD<T>, start: usize, values: &ArrayD<T>) {
    // Logical iteration order equals the flattened canonical (row-major)
    // ordering regardless of the underlying memory layout.
    for (slot, value) in arr.iter_mut().skip(start).zip(values.iter()) {
        *slot = value.clone();
    }
}

fn element_at<'a, T>(arr: &'a ArrayD<T>, index: &[usize]) -> BmiResult<&'a T> {
    if index.len() != arr.ndim() {
        return Err(BmiError::IndexOutOfRange {
            index: index.to_vec(),
            shape: arr.shape().to_vec(),
        });
    }
    arr.get(index).ok_or_else(|| BmiError::IndexOutOfRange {
        index: index.to_vec(),
        shape: arr.shape().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_by_three() -> ModelArray {
        ModelArray::F64(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn())
    }

    #[test]
    fn metadata() {
        let arr = two_by_three();
        assert_eq!(arr.element_type(), ElementType::F64);
        assert_eq!(arr.rank(), 2);
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr.len(), 6);
        assert_eq!(arr.nbytes(), 48);
        assert_eq!(arr.element_type().to_string(), "float64");
    }

    #[test]
    fn gather_matches_direct_access() {
        let arr = two_by_three();
        let indices = vec![vec![0, 0], vec![1, 2], vec![0, 1]];
        let picked = arr.gather(&indices).unwrap();

        assert_eq!(picked.shape(), &[3]);
        for (k, index) in indices.iter().enumerate() {
            assert_eq!(
                picked.value_as_f64(&[k]).unwrap(),
                arr.value_as_f64(index).unwrap()
            );
        }
    }

    #[test]
    fn gather_out_of_range() {
        let arr = two_by_three();
        let err = arr.gather(&[vec![2, 0]]).unwrap_err();
        assert!(matches!(err, BmiError::IndexOutOfRange { .. }));
    }

    #[test]
    fn gather_wrong_rank() {
        let arr = two_by_three();
        let err = arr.gather(&[vec![0]]).unwrap_err();
        assert!(matches!(err, BmiError::IndexOutOfRange { .. }));
    }

    #[test]
    fn scatter_overwrites_requested_elements() {
        let mut arr = two_by_three();
        let indices = vec![vec![0, 0], vec![1, 1]];
        arr.scatter("q", &indices, &ModelArray::from_f64(vec![-1.0, -2.0]))
            .unwrap();

        assert_eq!(arr.value_as_f64(&[0, 0]).unwrap(), -1.0);
        assert_eq!(arr.value_as_f64(&[1, 1]).unwrap(), -2.0);
        // Untouched elements keep their values
        assert_eq!(arr.value_as_f64(&[1, 2]).unwrap(), 6.0);
    }

    #[test]
    fn scatter_length_mismatch() {
        let mut arr = two_by_three();
        let err = arr
            .scatter("q", &[vec![0, 0]], &ModelArray::from_f64(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, BmiError::ShapeMismatch { .. }));
    }

    #[test]
    fn scatter_type_mismatch() {
        let mut arr = two_by_three();
        let values = ModelArray::I32(array![7].into_dyn());
        let err = arr.scatter("q", &[vec![0, 0]], &values).unwrap_err();
        assert!(matches!(err, BmiError::TypeMismatch { .. }));
    }

    #[test]
    fn gather_and_scatter_keep_integer_typing() {
        let mut arr = ModelArray::I32(array![[1, 2], [3, 4]].into_dyn());

        let picked = arr.gather(&[vec![1, 0]]).unwrap();
        assert_eq!(picked.element_type(), ElementType::I32);
        assert_eq!(picked.value_as_f64(&[0]).unwrap(), 3.0);

        arr.scatter("lu", &[vec![0, 1]], &ModelArray::I32(array![9].into_dyn()))
            .unwrap();
        assert_eq!(arr.value_as_f64(&[0, 1]).unwrap(), 9.0);
    }

    #[test]
    fn scatter_bad_index_leaves_array_unchanged() {
        let mut arr = two_by_three();
        let before = arr.clone();
        let err = arr
            .scatter(
                "q",
                &[vec![0, 0], vec![5, 5]],
                &ModelArray::from_f64(vec![9.0, 9.0]),
            )
            .unwrap_err();
        assert!(matches!(err, BmiError::IndexOutOfRange { .. }));
        assert_eq!(arr, before);
    }

    #[test]
    fn write_flat_contiguous_range() {
        let mut arr = two_by_three();
        arr.write_flat("q", 2, &ModelArray::from_f64(vec![30.0, 40.0]))
            .unwrap();

        // Row-major ordering: flat index 2 is [0, 2], flat index 3 is [1, 0]
        assert_eq!(arr.value_as_f64(&[0, 2]).unwrap(), 30.0);
        assert_eq!(arr.value_as_f64(&[1, 0]).unwrap(), 40.0);
    }

    #[test]
    fn write_flat_past_end() {
        let mut arr = two_by_three();
        let err = arr
            .write_flat("q", 5, &ModelArray::from_f64(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, BmiError::IndexOutOfRange { .. }));
    }

    #[test]
    fn validate_replacement_accepts_same_layout() {
        let arr = two_by_three();
        let replacement = ModelArray::F64(ArrayD::zeros(IxDyn(&[2, 3])));
        assert!(arr.validate_replacement("q", &replacement).is_ok());
    }

    #[test]
    fn validate_replacement_rejects_shape_change() {
        let arr = two_by_three();
        let replacement = ModelArray::F64(ArrayD::zeros(IxDyn(&[3, 2])));
        let err = arr.validate_replacement("q", &replacement).unwrap_err();
        assert!(matches!(err, BmiError::ShapeMismatch { .. }));
    }

    #[test]
    fn serialise_round_trip() {
        let arr = two_by_three();
        let json = serde_json::to_string(&arr).unwrap();
        let back: ModelArray = serde_json::from_str(&json).unwrap();
        assert_eq!(back, arr);
    }
}
