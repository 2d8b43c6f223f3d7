use std::collections::BTreeMap;

/// Values that count as "not set" even when present.
///
/// Empty strings, empty collections and numeric zero are blank.
/// Structured values and booleans are never blank, so an explicit `false` survives inheritance.
pub trait Blank {
    fn is_blank(&self) -> bool {
        false
    }
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for &str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Blank for BTreeMap<K, V> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for bool {}

macro_rules! zero_is_blank {
    ( $( $t:ty ),* ) => {
        $(
            impl Blank for $t {
                fn is_blank(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}
zero_is_blank!(u16, u32, u64, i32, i64);

pub trait Inherit {
    /// Fill the unset parts of this instance from another one.
    ///
    /// Values defined in `self` take precedence over values defined in `other`.
    fn inherit_from(self, other: Self) -> Self;
}

impl<T: Blank> Inherit for Option<T> {
    #[inline]
    fn inherit_from(self, other: Self) -> Self {
        match self {
            Some(v) if !v.is_blank() => Some(v),
            _ => other.filter(|v| !v.is_blank()),
        }
    }
}

/// Key-wise merge where the receiver's entries win
impl<K: Ord, V> Inherit for BTreeMap<K, V> {
    fn inherit_from(self, other: Self) -> Self {
        let mut merged = other;
        for (k, v) in self.into_iter() {
            merged.insert(k, v);
        }
        merged
    }
}

/// First non-blank value of a field across an ordered chain of sources
///
/// Earlier sources win. Returns `None` if every source leaves the field unset.
pub fn resolve<'a, S, T, F>(sources: impl IntoIterator<Item = &'a S>, pick: F) -> Option<T>
where
    S: 'a,
    T: Blank + Clone + 'a,
    F: Fn(&'a S) -> &'a Option<T>,
{
    sources
        .into_iter()
        .filter_map(|s| pick(s).as_ref())
        .find(|v| !v.is_blank())
        .cloned()
}

#[cfg(test)]
mod tests {
    use crate::{resolve, Inherit};
    use std::collections::BTreeMap;

    #[test]
    fn option() {
        let a = Some(1u32);
        let b = Some(2u32);
        let none = None;

        assert_eq!(a.inherit_from(b), a);
        assert_eq!(a.inherit_from(none), a);
        assert_eq!(none.inherit_from(b), b);
        assert_eq!(none.inherit_from(none), none);
    }

    #[test]
    fn blank_values_inherit() {
        assert_eq!(Some(String::new()).inherit_from(Some("y".to_string())), Some("y".into()));
        assert_eq!(Some(0u32).inherit_from(Some(7)), Some(7));
        assert_eq!(Some(Vec::<u32>::new()).inherit_from(Some(vec![1])), Some(vec![1]));
        // both blank collapses to unset
        assert_eq!(Some(String::new()).inherit_from(Some(String::new())), None);
    }

    #[test]
    fn explicit_false_survives() {
        assert_eq!(Some(false).inherit_from(Some(true)), Some(false));
        assert_eq!(None.inherit_from(Some(true)), Some(true));
    }

    #[test]
    fn btree_map() {
        let mut a = BTreeMap::new();
        a.insert("a", "a-value");
        a.insert("b", "a-value");

        let mut b = BTreeMap::new();
        b.insert("a", "b-value");
        b.insert("c", "b-value");

        let merged = a.inherit_from(b);
        let mut expected = BTreeMap::new();
        expected.insert("a", "a-value");
        expected.insert("b", "a-value");
        expected.insert("c", "b-value");
        assert_eq!(merged, expected);
    }

    #[test]
    fn resolve_chain() {
        struct Src {
            name: Option<String>,
        }
        let chain = vec![
            Src { name: None },
            Src { name: Some("".into()) },
            Src { name: Some("third".into()) },
            Src { name: Some("fourth".into()) },
        ];
        assert_eq!(resolve(&chain, |s| &s.name), Some("third".to_string()));
        assert_eq!(resolve(&chain[..2], |s| &s.name), None);
    }
}
