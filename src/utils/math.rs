/// Splits `x` into its floor and the remaining fraction in `[0, 1)`.
pub fn floor_fractional(x: f32) -> (isize, f32) {
    let x_floor = x.floor();
    (x_floor as isize, x - x_floor)
}
