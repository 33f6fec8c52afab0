//! Accurate integer inverse DCT.
//!
//! Separable LLM (Loeffler, Ligtenberg, Moschytz) transform with 13-bit fixed-point constants:
//! columns first into a scaled workspace, then rows. Intermediate values carry `PASS1_BITS`
//! extra bits of precision, one fewer for 12-bit data to keep the products in range.

const CONST_BITS: u32 = 13;

const FIX_0_298631336: i64 = 2446;
const FIX_0_390180644: i64 = 3196;
const FIX_0_541196100: i64 = 4433;
const FIX_0_765366865: i64 = 6270;
const FIX_0_899976223: i64 = 7373;
const FIX_1_175875602: i64 = 9633;
const FIX_1_501321110: i64 = 12299;
const FIX_1_847759065: i64 = 15137;
const FIX_1_961570560: i64 = 16069;
const FIX_2_053119869: i64 = 16819;
const FIX_2_562915447: i64 = 20995;
const FIX_3_072711026: i64 = 25172;

/// Right shift with rounding.
fn descale(x: i64, n: u32) -> i64 {
    (x + (1 << (n - 1))) >> n
}

/// One 8-point pass. Outputs are scaled up by `CONST_BITS`.
fn idct_1d(s: [i64; 8]) -> [i64; 8] {
    // Even part
    let z1 = (s[2] + s[6]) * FIX_0_541196100;
    let tmp2 = z1 - s[6] * FIX_1_847759065;
    let tmp3 = z1 + s[2] * FIX_0_765366865;

    let tmp0 = (s[0] + s[4]) << CONST_BITS;
    let tmp1 = (s[0] - s[4]) << CONST_BITS;

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    // Odd part
    let (o0, o1, o2, o3) = (s[7], s[5], s[3], s[1]);

    let z5 = (o0 + o1 + o2 + o3) * FIX_1_175875602;
    let z1 = -(o0 + o3) * FIX_0_899976223;
    let z2 = -(o1 + o2) * FIX_2_562915447;
    let z3 = z5 - (o0 + o2) * FIX_1_961570560;
    let z4 = z5 - (o1 + o3) * FIX_0_390180644;

    let o0 = o0 * FIX_0_298631336 + z1 + z3;
    let o1 = o1 * FIX_2_053119869 + z2 + z4;
    let o2 = o2 * FIX_3_072711026 + z2 + z3;
    let o3 = o3 * FIX_1_501321110 + z1 + z4;

    [
        tmp10 + o3,
        tmp11 + o2,
        tmp12 + o1,
        tmp13 + o0,
        tmp13 - o0,
        tmp12 - o1,
        tmp11 - o2,
        tmp10 - o3,
    ]
}

/// Dequantizes one block of natural-order coefficients and writes its 64 samples, level shifted
/// and clamped to `[0, 2^precision - 1]`, in row-major order.
pub fn idct_islow(coefficients: &[i16; 64], quant: &[u16; 64], precision: u8, output: &mut [i32; 64]) {
    let pass1_bits: u32 = if precision <= 8 { 2 } else { 1 };
    let center = 1i64 << (precision - 1);
    let max = (1i64 << precision) - 1;

    let mut workspace = [0i64; 64];
    for col in 0..8 {
        let input: [i64; 8] =
            std::array::from_fn(|row| coefficients[row * 8 + col] as i64 * quant[row * 8 + col] as i64);

        // Columns without AC terms are flat
        if input[1..].iter().all(|&value| value == 0) {
            let dc = input[0] << pass1_bits;
            for row in 0..8 {
                workspace[row * 8 + col] = dc;
            }
            continue;
        }

        for (row, value) in idct_1d(input).into_iter().enumerate() {
            workspace[row * 8 + col] = descale(value, CONST_BITS - pass1_bits);
        }
    }

    for row in 0..8 {
        let input: [i64; 8] = std::array::from_fn(|col| workspace[row * 8 + col]);
        // The 2-D transform carries an extra factor of 8
        for (col, value) in idct_1d(input).into_iter().enumerate() {
            let level = descale(value, CONST_BITS + pass1_bits + 3) + center;
            output[row * 8 + col] = level.clamp(0, max) as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const UNIT_QUANT: [u16; 64] = [1; 64];

    fn reference_idct(coefficients: &[i16; 64], precision: u8) -> [i32; 64] {
        let c = |k: usize| if k == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        let max = ((1 << precision) - 1) as f64;
        std::array::from_fn(|i| {
            let (y, x) = (i / 8, i % 8);
            let mut sum = 0.0;
            for v in 0..8 {
                for u in 0..8 {
                    sum += c(u)
                        * c(v)
                        * coefficients[v * 8 + u] as f64
                        * ((2 * x + 1) as f64 * u as f64 * PI / 16.0).cos()
                        * ((2 * y + 1) as f64 * v as f64 * PI / 16.0).cos();
                }
            }
            (sum / 4.0 + (1 << (precision - 1)) as f64).round().clamp(0.0, max) as i32
        })
    }

    #[test]
    fn zero_block_is_mid_gray() {
        let mut output = [0; 64];
        idct_islow(&[0; 64], &UNIT_QUANT, 8, &mut output);
        assert!(output.iter().all(|&sample| sample == 128));

        idct_islow(&[0; 64], &UNIT_QUANT, 12, &mut output);
        assert!(output.iter().all(|&sample| sample == 2048));
    }

    #[test]
    fn dc_scales_by_one_eighth() {
        let mut coefficients = [0; 64];
        coefficients[0] = 4;
        let mut quant = UNIT_QUANT;
        quant[0] = 4;

        let mut output = [0; 64];
        idct_islow(&coefficients, &quant, 8, &mut output);
        assert!(output.iter().all(|&sample| sample == 130));

        coefficients[0] = -1024;
        idct_islow(&coefficients, &UNIT_QUANT, 8, &mut output);
        assert!(output.iter().all(|&sample| sample == 0));
    }

    #[test]
    fn matches_floating_point_reference() {
        arbtest::arbtest(|u| {
            let precision = *u.choose(&[8u8, 12])?;
            let mut coefficients = [0i16; 64];
            for _ in 0..u.int_in_range(1..=6)? {
                let index = u.int_in_range(0..=63usize)?;
                coefficients[index] = u.int_in_range(-64..=64)?;
            }

            let mut output = [0; 64];
            idct_islow(&coefficients, &UNIT_QUANT, precision, &mut output);
            let expected = reference_idct(&coefficients, precision);
            for (actual, expected) in output.iter().zip(expected) {
                assert!(
                    (actual - expected).abs() <= 1,
                    "{actual} vs {expected} for {coefficients:?}"
                );
            }
            Ok(())
        });
    }
}
