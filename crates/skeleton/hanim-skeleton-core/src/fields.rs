//! Argument validation shared by every field setter.
//!
//! Setters validate first and copy second, so a rejected call leaves the
//! target untouched.

use crate::error::SkeletonError;
use crate::Result;

pub(crate) fn vec3_arg(field: &str, val: &[f32]) -> Result<[f32; 3]> {
    match val {
        [x, y, z, ..] => Ok([*x, *y, *z]),
        _ => Err(SkeletonError::too_short(field, 3, val.len())),
    }
}

pub(crate) fn vec4_arg(field: &str, val: &[f32]) -> Result<[f32; 4]> {
    match val {
        [x, y, z, w, ..] => Ok([*x, *y, *z, *w]),
        _ => Err(SkeletonError::too_short(field, 4, val.len())),
    }
}

/// Replace the valid contents of `dst` with the first `count` items of `src`.
///
/// The backing allocation is reused and only grows; entries past `count`
/// are dropped.
pub(crate) fn replace_valid<T: Clone>(
    field: &str,
    dst: &mut Vec<T>,
    src: &[T],
    count: usize,
) -> Result<()> {
    if src.len() < count {
        return Err(SkeletonError::too_short(field, count, src.len()));
    }
    dst.clear();
    dst.extend_from_slice(&src[..count]);
    Ok(())
}

/// Number of floats in `num_elements` xyz triples.
pub(crate) fn triple_len(field: &str, num_elements: usize) -> Result<usize> {
    num_elements
        .checked_mul(3)
        .ok_or_else(|| SkeletonError::InvalidArgument {
            field: field.to_string(),
            reason: format!("{num_elements} triples overflow the float count"),
        })
}

/// Float triples variant of [`replace_valid`]: `num_elements` counts triples.
pub(crate) fn replace_triples(
    field: &str,
    dst: &mut Vec<f32>,
    src: &[f32],
    num_elements: usize,
) -> Result<()> {
    let floats = triple_len(field, num_elements)?;
    replace_valid(field, dst, src, floats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_vectors_are_rejected() {
        assert!(vec3_arg("center", &[1.0, 2.0]).is_err());
        assert_eq!(vec3_arg("center", &[1.0, 2.0, 3.0, 4.0]).unwrap(), [1.0, 2.0, 3.0]);
        assert!(vec4_arg("rotation", &[0.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn replace_keeps_capacity_and_drops_tail() {
        let mut dst = Vec::new();
        replace_triples("lowerLimit", &mut dst, &[1.0; 15], 5).unwrap();
        let cap = dst.capacity();
        replace_triples("lowerLimit", &mut dst, &[2.0; 6], 2).unwrap();
        assert_eq!(dst, vec![2.0; 6]);
        assert_eq!(dst.capacity(), cap);
    }

    #[test]
    fn huge_triple_counts_are_rejected() {
        let mut dst = vec![1.0f32; 3];
        let err = replace_triples("displacements", &mut dst, &[0.0; 3], usize::MAX).unwrap_err();
        assert_eq!(err.category(), "argument");
        assert_eq!(dst, vec![1.0; 3]);
        assert_eq!(triple_len("skinCoord", 4).unwrap(), 12);
    }

    #[test]
    fn failed_replace_leaves_target_unchanged() {
        let mut dst = vec![1u32, 2, 3];
        let err = replace_valid("skinCoordIndex", &mut dst, &[9, 9], 4).unwrap_err();
        assert_eq!(err.category(), "argument");
        assert_eq!(dst, vec![1, 2, 3]);
    }
}
