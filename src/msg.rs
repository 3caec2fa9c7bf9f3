/// A payload that can travel over a topic.
///
/// Messages are cloned once per receiving subscription.
pub trait Message: Clone + Send + Sync + 'static {
    /// Interface name, e.g. `std_msgs/msg/String`.
    fn type_name() -> &'static str;
}

pub mod std_msgs {
    pub mod msg {
        use crate::msg::Message;

        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
        pub struct String {
            pub data: std::string::String,
        }

        impl Message for String {
            fn type_name() -> &'static str {
                "std_msgs/msg/String"
            }
        }

        impl From<&str> for String {
            fn from(data: &str) -> Self {
                Self {
                    data: data.to_owned(),
                }
            }
        }

        impl From<std::string::String> for String {
            fn from(data: std::string::String) -> Self {
                Self { data }
            }
        }
    }
}
