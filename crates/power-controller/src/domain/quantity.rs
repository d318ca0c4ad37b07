//! Minimal Kubernetes resource quantity handling for CPU requests.

/// Returns the number of whole CPUs `quantity` stands for.
///
/// `None` when the quantity has a fractional part (`"1500m"`, `"0.5"`), is
/// negative or cannot be parsed. The static CPU manager only pins containers
/// whose request is an integer number of cores.
pub fn whole_cpus(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);
    let (scale_num, scale_den) = suffix_scale(suffix)?;

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let mantissa: u128 = digits.parse().ok()?;
    let frac_den = 10u128.checked_pow(u32::try_from(frac_part.len()).ok()?)?;

    let numerator = mantissa.checked_mul(scale_num)?;
    let denominator = frac_den.checked_mul(scale_den)?;
    if numerator % denominator != 0 {
        return None;
    }

    u64::try_from(numerator / denominator).ok()
}

fn suffix_scale(suffix: &str) -> Option<(u128, u128)> {
    let scale = match suffix {
        "" => (1, 1),
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => return None,
    };
    Some(scale)
}
