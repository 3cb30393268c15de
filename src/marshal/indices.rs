//! Index arrays for indexed and face-varying data.

/// Reverses the winding of every face in `indices`. Negative face counts
/// count as empty faces. A face running past the end is skipped without
/// advancing, so later faces that still fit are reversed in its place and
/// untouched indices are copied as is. Applying it twice gives back the input.
pub fn reverse_winding(indices: &[u32], vertex_counts: &[i32]) -> Vec<u32> {
    let mut out = indices.to_vec();
    let mut offset = 0usize;
    for &count in vertex_counts {
        let count = count.max(0) as usize;
        if offset + count > out.len() {
            continue;
        }
        out[offset..offset + count].reverse();
        offset += count;
    }
    out
}

/// Face-vertex indices from explicit host indices, reversed per face when
/// `vertex_counts` is given. Fewer than three indices cannot describe a face
/// and yield an empty array.
pub fn explicit_vertex_idxs(indices: &[i32], vertex_counts: Option<&[i32]>) -> Vec<u32> {
    if indices.len() < 3 {
        return Vec::new();
    }
    let idxs: Vec<u32> = indices.iter().map(|&i| i.max(0) as u32).collect();
    match vertex_counts {
        Some(counts) => reverse_winding(&idxs, counts),
        None => idxs,
    }
}

/// Identity indices `0..num_elements`, reversed per face when
/// `vertex_counts` is given. `None` when the element count does not match
/// the face-vertex total.
pub fn generate_vertex_idxs(
    num_elements: usize,
    vertex_counts: Option<&[i32]>,
    vertex_count_sum: usize,
) -> Option<Vec<u32>> {
    if num_elements != vertex_count_sum {
        return None;
    }
    let idxs: Vec<u32> = (0..num_elements as u32).collect();
    Some(match vertex_counts {
        Some(counts) => reverse_winding(&idxs, counts),
        None => idxs,
    })
}

/// Sum of face vertex counts, negative counts clamped to zero.
pub fn vertex_count_sum(vertex_counts: &[i32]) -> usize {
    vertex_counts.iter().map(|&c| c.max(0) as usize).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_winding_per_face() {
        let idxs = [0, 1, 2, 3, 4, 5, 6];
        assert_eq!(reverse_winding(&idxs, &[3, 4]), vec![2, 1, 0, 6, 5, 4, 3]);
    }

    #[test]
    fn test_reverse_winding_skips_overflowing_face() {
        let idxs = [0, 1, 2, 3, 4];
        assert_eq!(reverse_winding(&idxs, &[3, 4]), vec![2, 1, 0, 3, 4]);
        // The face of four does not fit, the face of two after it does.
        assert_eq!(reverse_winding(&idxs, &[3, 4, 2]), vec![2, 1, 0, 4, 3]);
        assert_eq!(reverse_winding(&reverse_winding(&idxs, &[3, 4, 2]), &[3, 4, 2]), idxs.to_vec());
    }

    #[test]
    fn test_negative_counts_are_empty_faces() {
        assert_eq!(reverse_winding(&[0, 1, 2], &[-2, 3]), vec![2, 1, 0]);
        assert_eq!(vertex_count_sum(&[-2, 3, 4]), 7);
    }

    #[test]
    fn test_generate_requires_matching_totals() {
        assert_eq!(generate_vertex_idxs(4, None, 4), Some(vec![0, 1, 2, 3]));
        assert_eq!(generate_vertex_idxs(4, Some(&[4]), 4), Some(vec![3, 2, 1, 0]));
        assert_eq!(generate_vertex_idxs(5, Some(&[4]), 4), None);
    }

    #[test]
    fn test_explicit_indices() {
        assert_eq!(explicit_vertex_idxs(&[0, 1], None), Vec::<u32>::new());
        assert_eq!(explicit_vertex_idxs(&[5, 6, 7], Some(&[3])), vec![7, 6, 5]);
    }
}
