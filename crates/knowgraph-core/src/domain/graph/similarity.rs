//! Vector math over embeddings

/// Calculate cosine similarity between two vectors
///
/// Returns 0.0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Element-wise arithmetic mean of a set of equal-length vectors
pub fn mean_vector<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum: Vec<f32> = first.to_vec();
    let mut count = 1usize;

    for v in iter {
        if v.len() != sum.len() {
            continue;
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
        count += 1;
    }

    let n = count as f32;
    sum.iter_mut().for_each(|x| *x /= n);
    Some(sum)
}

/// Average cosine similarity over every unordered pair
///
/// A set with fewer than two vectors is perfectly coherent (1.0).
pub fn average_pairwise_similarity(vectors: &[&[f32]]) -> f32 {
    if vectors.len() < 2 {
        return 1.0;
    }

    let mut total = 0.0f32;
    let mut pairs = 0usize;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            total += cosine_similarity(vectors[i], vectors[j]);
            pairs += 1;
        }
    }

    total / pairs as f32
}

/// Average similarity between every member of `a` and every member of `b`
pub fn average_linkage(a: &[&[f32]], b: &[&[f32]]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut total = 0.0f32;
    for x in a {
        for y in b {
            total += cosine_similarity(x, y);
        }
    }
    total / (a.len() * b.len()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.3, -1.2, 4.5, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let v = vec![1.0, 2.0, 3.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_mean_vector() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let mean = mean_vector([&a[..], &b[..]]).unwrap();
        assert_eq!(mean, vec![0.5, 0.5]);
        assert!(mean_vector(std::iter::empty::<&[f32]>()).is_none());
    }

    #[test]
    fn test_average_pairwise() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert_eq!(average_pairwise_similarity(&[&a[..]]), 1.0);
        assert!(average_pairwise_similarity(&[&a[..], &b[..]]).abs() < 1e-6);
        assert!((average_pairwise_similarity(&[&a[..], &a[..], &a[..]]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_average_linkage() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((average_linkage(&[&a[..]], &[&a[..], &b[..]]) - 0.5).abs() < 1e-6);
        assert_eq!(average_linkage(&[], &[&a[..]]), 0.0);
    }
}
