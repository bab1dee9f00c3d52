/// One fact about a request. A list of these is used instead of a map so the
/// rendered output keeps a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    key: String,
    val: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, val: impl Into<String>) -> Self {
        Self { key: key.into(), val: val.into() }
    }

    pub fn key(&self) -> &str { &self.key }

    pub fn val(&self) -> &str { &self.val }
}

pub type PairList = Vec<Pair>;

/// Renders pairs as space separated `key=val` tokens in list order.
///
/// Pairs with an empty value are left out. Keys and values are written as-is,
/// so a value containing `=` or a space will not parse back unambiguously.
pub fn render(pairs: &[Pair]) -> String {
    pairs
        .iter()
        .filter(|p| !p.val.is_empty())
        .map(|p| format!("{}={}", p.key, p.val))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_list() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_render_skips_empty_values() {
        assert_eq!(render(&[Pair::new("source", "")]), "");

        let pairs = vec![
            Pair::new("time", "1.000"),
            Pair::new("destination", ""),
            Pair::new("ecs", "1.2.3.0/24/0"),
        ];
        assert_eq!(render(&pairs), "time=1.000 ecs=1.2.3.0/24/0");
    }

    #[test]
    fn test_render_keeps_input_order() {
        let pairs = vec![
            Pair::new("z", "1"),
            Pair::new("a", "2"),
            Pair::new("m", "3"),
        ];
        assert_eq!(render(&pairs), "z=1 a=2 m=3");
    }

    #[test]
    fn test_render_duplicates_and_unescaped() {
        let pairs = vec![
            Pair::new("k", "a b"),
            Pair::new("k", "x=y"),
        ];
        assert_eq!(render(&pairs), "k=a b k=x=y");
    }
}
