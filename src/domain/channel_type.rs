/// Kind of channel a subscriber is identified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    PhoneNumber,
    Ip,
}

impl ChannelType {
    pub fn is_phone_number(&self) -> bool {
        matches!(self, ChannelType::PhoneNumber)
    }

    /// Only phone numbers support outbound delivery for now.
    pub fn supports_delivery(&self) -> bool {
        self.is_phone_number()
    }

    pub fn parse(channel: String) -> Result<ChannelType, String> {
        match channel.as_str() {
            "phone_number" => Ok(ChannelType::PhoneNumber),
            "ip" => Ok(ChannelType::Ip),
            _ => Err(format!("{} is not a valid channel type", channel)),
        }
    }
}

impl AsRef<str> for ChannelType {
    fn as_ref(&self) -> &str {
        match self {
            ChannelType::PhoneNumber => "phone_number",
            ChannelType::Ip => "ip",
        }
    }
}
