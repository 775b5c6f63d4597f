use glam::{DMat4, DVec3, Mat4, Vec3};

const QUANTIZATION_RANGE: f64 = 65535.0;

/// Vertex positions compressed to 16 bits per axis inside their bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedPositions {
    pub positions: Vec<[u16; 3]>,
    /// Expands a quantized position back into object space: `decode * (q, 1)`.
    pub decode_matrix: Mat4,
    pub min: Vec3,
    pub max: Vec3,
}

impl QuantizedPositions {
    pub fn decode(&self, quantized: [u16; 3]) -> Vec3 {
        let q = Vec3::new(
            quantized[0] as f32,
            quantized[1] as f32,
            quantized[2] as f32,
        );
        self.decode_matrix.transform_point3(q)
    }

    /// Largest per-axis error the round trip can introduce.
    pub fn step(&self) -> Vec3 {
        (self.max - self.min) / QUANTIZATION_RANGE as f32
    }
}

/// Quantizes object-space positions into the `u16` range of their AABB and builds
/// the matching decode matrix.
pub fn quantize_positions(positions: &[[f32; 3]]) -> QuantizedPositions {
    let Some(first) = positions.first() else {
        return QuantizedPositions {
            positions: Vec::new(),
            decode_matrix: Mat4::IDENTITY,
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        };
    };

    let first = Vec3::from_array(*first);
    let (min, max) = positions.iter().fold((first, first), |(min, max), p| {
        let p = Vec3::from_array(*p);
        (min.min(p), max.max(p))
    });

    let min_d = min.as_dvec3();
    let extent = max.as_dvec3() - min_d;
    let multiplier = DVec3::new(
        axis_multiplier(extent.x),
        axis_multiplier(extent.y),
        axis_multiplier(extent.z),
    );

    let quantized = positions
        .iter()
        .map(|p| {
            let q = (Vec3::from_array(*p).as_dvec3() - min_d) * multiplier;
            [
                quantize_axis(q.x),
                quantize_axis(q.y),
                quantize_axis(q.z),
            ]
        })
        .collect();

    let decode = DMat4::from_translation(min_d) * DMat4::from_scale(extent / QUANTIZATION_RANGE);

    QuantizedPositions {
        positions: quantized,
        decode_matrix: decode.as_mat4(),
        min,
        max,
    }
}

fn axis_multiplier(extent: f64) -> f64 {
    if extent > 0.0 {
        QUANTIZATION_RANGE / extent
    } else {
        0.0
    }
}

fn quantize_axis(value: f64) -> u16 {
    value.round().clamp(0.0, QUANTIZATION_RANGE) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_quantization_within_one_step() {
        let positions = [
            [-1.5, 0.0, 2.0],
            [3.25, 8.0, -4.0],
            [0.1, 0.2, 0.3],
            [2.0, 7.999, -3.5],
        ];
        let quantized = quantize_positions(&positions);
        let tolerance = quantized.step() + Vec3::splat(1e-5);

        for (original, q) in positions.iter().zip(&quantized.positions) {
            let decoded = quantized.decode(*q);
            let error = (decoded - Vec3::from_array(*original)).abs();
            assert!(
                error.cmple(tolerance).all(),
                "{original:?} decoded to {decoded:?}"
            );
        }
    }

    #[test]
    fn extremes_map_to_range_ends() {
        let quantized = quantize_positions(&[[0.0, -2.0, 5.0], [10.0, 2.0, 5.0]]);
        assert_eq!(quantized.positions[0], [0, 0, 0]);
        assert_eq!(quantized.positions[1], [65535, 65535, 0]);
    }

    #[test]
    fn flat_axis_decodes_to_its_constant() {
        let quantized = quantize_positions(&[[1.0, 4.0, 7.0], [3.0, 4.0, 9.0]]);
        let decoded = quantized.decode(quantized.positions[1]);
        assert_eq!(decoded.y, 4.0);
    }

    #[test]
    fn empty_input_yields_identity_decode() {
        let quantized = quantize_positions(&[]);
        assert!(quantized.positions.is_empty());
        assert_eq!(quantized.decode_matrix, Mat4::IDENTITY);
    }
}
