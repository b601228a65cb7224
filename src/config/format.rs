use taplo::formatter;

/// 统一配置文件的 TOML 风格（4 空格缩进），启动时写回
pub fn format_toml(input: &str) -> String {
    let options = formatter::Options {
        indent_string: "    ".to_string(),
        ..Default::default()
    };
    formatter::format(input, options)
}
