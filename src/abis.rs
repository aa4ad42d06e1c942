use ethers::contract::abigen;

abigen!(
    ProxyFactory,
    r#"[
        event ProxyCreation(address proxy)
    ]"#
);
