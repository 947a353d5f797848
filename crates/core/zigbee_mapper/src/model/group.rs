use serde::Deserialize;

/// The retained `bridge/groups` entry for a single group.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeGroup {
    pub id: u32,
    pub friendly_name: String,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMember {
    pub ieee_address: String,
    #[serde(default)]
    pub endpoint: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub id: u32,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_with_members_and_scenes() {
        let json = r#"{
            "id": 1,
            "friendly_name": "Living room",
            "members": [{"ieee_address":"0xabc","endpoint":1}],
            "scenes": [{"id":1,"name":"Evening"}]
        }"#;
        let group: BridgeGroup = serde_json::from_str(json).unwrap();
        assert_eq!(group.friendly_name, "Living room");
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.scenes[0].name, "Evening");
    }
}
