#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PolicyError {
    UnsupportedFilesystemPath {
        path: String,
    },
    InvalidDeniedErrno {
        errno: i32,
    },
    SerializationFailed {
        description: &'static str,
    },
    DeserializationFailed {
        description: &'static str,
    },
}

impl From<postcard::Error> for PolicyError {
    fn from(e: postcard::Error) -> Self {
        let description = match e {
            postcard::Error::WontImplement => "tried to use a feature postcard won't support",
            postcard::Error::NotYetImplemented => "tried to use a feature not supported by postcard",
            postcard::Error::SerializeBufferFull => "policy too long",
            postcard::Error::SerializeSeqLengthUnknown => "postcard requires sequence length to be known",
            postcard::Error::SerdeSerCustom => "postcard serde serialization error",
            postcard::Error::CollectStrError => "postcard collect_str error",
            postcard::Error::DeserializeUnexpectedEnd => "postcard expected more data",
            postcard::Error::DeserializeBadVarint => "postcard found a varint that did not terminate",
            postcard::Error::DeserializeBadBool => "postcard found a bool that was neither 0 nor 1",
            postcard::Error::DeserializeBadChar | postcard::Error::DeserializeBadUtf8 => "postcard found an invalid unicode char",
            postcard::Error::DeserializeBadOption => "postcard found an option discriminant that was neither 0 nor 1",
            postcard::Error::DeserializeBadEnum => "postcard found an enum discriminant that was >u32max",
            postcard::Error::DeserializeBadEncoding => "postcard reports invalid encoding",
            postcard::Error::SerdeDeCustom => "postcard serde deserialization error",
            _ => "unknown",
        };
        match e {
            postcard::Error::SerializeBufferFull
            | postcard::Error::SerializeSeqLengthUnknown
            | postcard::Error::SerdeSerCustom
            | postcard::Error::CollectStrError => Self::SerializationFailed { description },
            _ => Self::DeserializationFailed { description },
        }
    }
}
