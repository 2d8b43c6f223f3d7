use inherit::Blank;

/// Toleration for a node taint
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Toleration {
    pub key: String,
    /// `Equal` or `Exists`
    pub operator: String,
    pub value: String,
    /// `NoSchedule`, `PreferNoSchedule` or `NoExecute`
    pub effect: String,
}

impl Blank for Toleration {}
