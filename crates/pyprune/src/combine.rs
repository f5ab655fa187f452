/// Merge two configuration layers, `self` taking precedence over `other`.
pub trait Combine {
    fn combine(self, other: Self) -> Self;
}
